//! Rulebook YAML: `meta`, `schemas`, `binding` — deserializes straight into
//! `crate::rulebook::Rulebook` and runs its structural validation.

use crate::error::Result;
use crate::rulebook::Rulebook;
use std::path::Path;

pub fn load_rulebook(path: &Path) -> Result<Rulebook> {
    let text = std::fs::read_to_string(path)?;
    let rulebook: Rulebook = serde_yaml::from_str(&text)?;
    rulebook.validate()?;
    Ok(rulebook)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn loads_and_validates_minimal_rulebook() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(
            f,
            r#"
meta:
  version: "2.0"
schemas:
  on_course_open:
    los_bands:
      - {{letter: A, min: 0.0, max: 0.36}}
      - {{letter: F, min: 0.36, max: .inf}}
binding:
  - flow_type: open
    schema: on_course_open
    priority: 0
"#
        )
        .unwrap();
        let rulebook = load_rulebook(f.path()).unwrap();
        assert!(rulebook.schemas.contains_key("on_course_open"));
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(
            f,
            r#"
meta:
  version: "1.0"
schemas:
  s:
    los_bands:
      - {{letter: A, min: 0.0, max: .inf}}
"#
        )
        .unwrap();
        assert!(load_rulebook(f.path()).is_err());
    }
}
