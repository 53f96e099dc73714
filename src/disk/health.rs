//! # Health-attribute evaluation against failure thresholds.
//!
//! Drive health attributes are sampled on a slower cadence than throughput
//! statistics. Crossing any threshold takes the disk out of service; the
//! attribute that crossed is reported so the operator log says why.

/// Health attributes sampled from a drive.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HealthAttrs {
    /// Drive temperature, degrees Celsius.
    pub temperature_c: f32,
    /// Reallocated sector count.
    pub realloc_sectors: u32,
    /// Sectors pending reallocation.
    pub pending_sectors: u32,
}

/// Failure thresholds for health attributes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthThresholds {
    /// Maximum tolerated temperature.
    pub max_temperature_c: f32,
    /// Maximum tolerated reallocated sector count.
    pub max_realloc_sectors: u32,
    /// Maximum tolerated pending-reallocation count.
    pub max_pending_sectors: u32,
}

impl Default for HealthThresholds {
    /// Defaults: 65°C, 50 reallocated sectors, 10 pending.
    fn default() -> Self {
        Self {
            max_temperature_c: 65.0,
            max_realloc_sectors: 50,
            max_pending_sectors: 10,
        }
    }
}

/// The attribute that crossed its threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HealthBreach {
    Temperature { value: f32, max: f32 },
    Reallocated { value: u32, max: u32 },
    Pending { value: u32, max: u32 },
}

impl std::fmt::Display for HealthBreach {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthBreach::Temperature { value, max } => {
                write!(f, "temperature {value:.1}C over limit {max:.1}C")
            }
            HealthBreach::Reallocated { value, max } => {
                write!(f, "{value} reallocated sectors over limit {max}")
            }
            HealthBreach::Pending { value, max } => {
                write!(f, "{value} pending sectors over limit {max}")
            }
        }
    }
}

impl HealthThresholds {
    /// Returns the first threshold `attrs` crosses, if any.
    pub fn breach(&self, attrs: &HealthAttrs) -> Option<HealthBreach> {
        if attrs.temperature_c > self.max_temperature_c {
            return Some(HealthBreach::Temperature {
                value: attrs.temperature_c,
                max: self.max_temperature_c,
            });
        }
        if attrs.realloc_sectors > self.max_realloc_sectors {
            return Some(HealthBreach::Reallocated {
                value: attrs.realloc_sectors,
                max: self.max_realloc_sectors,
            });
        }
        if attrs.pending_sectors > self.max_pending_sectors {
            return Some(HealthBreach::Pending {
                value: attrs.pending_sectors,
                max: self.max_pending_sectors,
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_healthy_attrs_pass() {
        let thresholds = HealthThresholds::default();
        let attrs = HealthAttrs {
            temperature_c: 40.0,
            realloc_sectors: 3,
            pending_sectors: 0,
        };
        assert_eq!(thresholds.breach(&attrs), None);
    }

    #[test]
    fn test_each_threshold_trips() {
        let thresholds = HealthThresholds {
            max_temperature_c: 60.0,
            max_realloc_sectors: 5,
            max_pending_sectors: 2,
        };
        assert!(matches!(
            thresholds.breach(&HealthAttrs {
                temperature_c: 61.0,
                ..Default::default()
            }),
            Some(HealthBreach::Temperature { .. })
        ));
        assert!(matches!(
            thresholds.breach(&HealthAttrs {
                realloc_sectors: 6,
                ..Default::default()
            }),
            Some(HealthBreach::Reallocated { .. })
        ));
        assert!(matches!(
            thresholds.breach(&HealthAttrs {
                pending_sectors: 3,
                ..Default::default()
            }),
            Some(HealthBreach::Pending { .. })
        ));
    }

    #[test]
    fn test_boundary_is_not_a_breach() {
        let thresholds = HealthThresholds::default();
        let attrs = HealthAttrs {
            temperature_c: 65.0,
            realloc_sectors: 50,
            pending_sectors: 10,
        };
        assert_eq!(thresholds.breach(&attrs), None);
    }
}
