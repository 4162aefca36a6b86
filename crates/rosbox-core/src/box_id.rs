//! Box naming convention

use crate::{CoreError, Result};

/// Identity of a managed box: a display name plus the configured suffix.
///
/// The backend sees `<display>_<suffix>`; users only ever see the display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BoxId {
    display: String,
    suffix: String,
}

impl BoxId {
    /// Validate a user-supplied display name
    pub fn new(display: &str, suffix: &str) -> Result<Self> {
        if !is_valid_display_name(display) {
            return Err(CoreError::InvalidName(display.to_string()));
        }
        Ok(Self {
            display: display.to_string(),
            suffix: suffix.to_string(),
        })
    }

    /// Recover a box identity from a backend container name.
    /// Returns `None` for containers that do not follow the naming convention.
    pub fn from_backend_name(name: &str, suffix: &str) -> Option<Self> {
        let name = name.trim_start_matches('/');
        let display = name.strip_suffix(suffix)?.strip_suffix('_')?;
        Self::new(display, suffix).ok()
    }

    /// Name of the container on the backend
    pub fn backend_name(&self) -> String {
        format!("{}_{}", self.display, self.suffix)
    }

    /// Name shown to the user and used as the container hostname
    pub fn display_name(&self) -> &str {
        &self.display
    }
}

impl std::fmt::Display for BoxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display)
    }
}

fn is_valid_display_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_name_roundtrip() {
        let id = BoxId::new("rig1", "rosbox").unwrap();
        assert_eq!(id.backend_name(), "rig1_rosbox");
        assert_eq!(id.display_name(), "rig1");

        let back = BoxId::from_backend_name(&id.backend_name(), "rosbox").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_from_backend_name_rejects_foreign_names() {
        assert!(BoxId::from_backend_name("postgres", "rosbox").is_none());
        assert!(BoxId::from_backend_name("rosbox", "rosbox").is_none());
        assert!(BoxId::from_backend_name("_rosbox", "rosbox").is_none());
        assert!(BoxId::from_backend_name("rig1rosbox", "rosbox").is_none());
    }

    #[test]
    fn test_from_backend_name_strips_leading_slash() {
        let id = BoxId::from_backend_name("/sim.v2_rosbox", "rosbox").unwrap();
        assert_eq!(id.display_name(), "sim.v2");
    }

    #[test]
    fn test_display_name_may_contain_underscores() {
        let id = BoxId::from_backend_name("my_robot_rosbox", "rosbox").unwrap();
        assert_eq!(id.display_name(), "my_robot");
    }

    #[test]
    fn test_invalid_display_names() {
        for name in ["", "-lead", ".hidden", "has space", "slash/name", "ünï"] {
            assert!(
                matches!(BoxId::new(name, "rosbox"), Err(CoreError::InvalidName(_))),
                "{name:?} should be rejected"
            );
        }
        assert!(BoxId::new("a", "rosbox").is_ok());
        assert!(BoxId::new("Rig-1.b_c", "rosbox").is_ok());
    }
}
