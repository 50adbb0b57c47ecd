//! Macro for implementing Display and FromStr for status enums
//!
//! Persisted state columns and log fields use the lowercase string form, so
//! every status enum gets the same pair of conversions.
//!
//! # Example
//!
//! ```rust
//! use retryflow_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum Phase {
//!     Waiting,
//!     Done,
//! }
//!
//! impl_domain_status_conversions!(Phase {
//!     Waiting => "waiting",
//!     Done => "done",
//! });
//!
//! assert_eq!(Phase::Waiting.to_string(), "waiting");
//! assert_eq!("DONE".parse::<Phase>().unwrap(), Phase::Done);
//! ```

/// Implements Display and FromStr traits for status enums
///
/// - Display writes the mapped lowercase string
/// - FromStr parses case-insensitively and reports the enum name on failure
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => write!(f, $str),)+
                }
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum LampState {
        Off,
        Blinking,
    }

    impl_domain_status_conversions!(LampState {
        Off => "off",
        Blinking => "blinking",
    });

    #[test]
    fn test_display_uses_mapped_string() {
        assert_eq!(LampState::Off.to_string(), "off");
        assert_eq!(LampState::Blinking.to_string(), "blinking");
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(LampState::from_str("BLINKING").unwrap(), LampState::Blinking);
        assert_eq!(LampState::from_str("Off").unwrap(), LampState::Off);
    }

    #[test]
    fn test_parse_failure_names_the_enum() {
        let err = LampState::from_str("dim").unwrap_err();
        assert_eq!(err, "Invalid LampState: dim");
        assert!(LampState::from_str("").is_err());
    }

    mod with_result_alias {
        #[allow(dead_code)]
        type Result<T> = std::result::Result<T, crate::RetryFlowError>;

        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub(super) enum Valve {
            Open,
            Shut,
        }

        impl_domain_status_conversions!(Valve {
            Open => "open",
            Shut => "shut",
        });
    }

    #[test]
    fn test_expands_beside_a_one_parameter_result_alias() {
        use with_result_alias::Valve;

        assert_eq!(Valve::from_str("SHUT").unwrap(), Valve::Shut);
        assert_eq!(Valve::Open.to_string(), "open");
        assert_eq!(Valve::from_str("ajar").unwrap_err(), "Invalid Valve: ajar");
    }
}
