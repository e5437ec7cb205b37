//! Desktop entry parsing.
//!
//! Only the `[Desktop Entry]` group is retained; other groups (desktop
//! actions) are syntax-checked and skipped.

use std::collections::BTreeMap;

/// Name of the main group
pub const MAIN_GROUP: &str = "Desktop Entry";

/// Keys every application entry must carry
pub const REQUIRED_KEYS: &[&str] = &["Name", "Exec", "Icon", "Type"];

/// Parsed `[Desktop Entry]` group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopEntry {
    entries: BTreeMap<String, String>,
}

impl DesktopEntry {
    /// Parse desktop entry text
    pub fn parse(content: &str) -> Result<Self, String> {
        let mut entries = BTreeMap::new();
        let mut group: Option<String> = None;
        let mut seen_main = false;

        for (idx, raw) in content.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[') {
                let name = name
                    .strip_suffix(']')
                    .ok_or_else(|| format!("line {line_no}: unterminated group header"))?;
                if name == MAIN_GROUP {
                    if seen_main {
                        return Err(format!("line {line_no}: duplicate [{MAIN_GROUP}] group"));
                    }
                    seen_main = true;
                }
                group = Some(name.to_string());
                continue;
            }

            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| format!("line {line_no}: expected key=value"))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(format!("line {line_no}: empty key"));
            }

            match group.as_deref() {
                None => return Err(format!("line {line_no}: key `{key}` outside of any group")),
                Some(MAIN_GROUP) => {
                    if entries.insert(key.to_string(), value.trim().to_string()).is_some() {
                        return Err(format!("line {line_no}: duplicate key `{key}`"));
                    }
                }
                Some(_) => {}
            }
        }

        if !seen_main {
            return Err(format!("missing [{MAIN_GROUP}] group"));
        }
        Ok(Self { entries })
    }

    /// Value of an unlocalized key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Program invoked by `Exec=` with quoting removed
    pub fn exec_program(&self) -> Option<String> {
        let exec = self.get("Exec")?.trim();
        let program = if let Some(rest) = exec.strip_prefix('"') {
            rest.split('"').next().unwrap_or("")
        } else {
            exec.split_whitespace().next().unwrap_or("")
        };
        (!program.is_empty()).then(|| program.to_string())
    }

    /// Program named by `TryExec=`, if present
    pub fn try_exec(&self) -> Option<&str> {
        self.get("TryExec").map(str::trim).filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTRY: &str = "\
# Generated by hand
[Desktop Entry]
Type=Application
Name=Image Inpainter
Name[de]=Bildretusche
Exec=image-inpainter %F
Icon=com.example.ImageInpainter
Categories=Graphics;

[Desktop Action new-window]
Name=New Window
Exec=image-inpainter --new-window
";

    #[test]
    fn test_parse_main_group_only() {
        let entry = DesktopEntry::parse(ENTRY).unwrap();
        assert_eq!(entry.get("Name"), Some("Image Inpainter"));
        assert_eq!(entry.get("Name[de]"), Some("Bildretusche"));
        assert_eq!(entry.get("Exec"), Some("image-inpainter %F"));
        assert_eq!(entry.exec_program().as_deref(), Some("image-inpainter"));
        assert_eq!(entry.try_exec(), None);
    }

    #[test]
    fn test_quoted_exec() {
        let entry = DesktopEntry::parse("[Desktop Entry]\nExec=\"/usr/bin/my app\" %u\n").unwrap();
        assert_eq!(entry.exec_program().as_deref(), Some("/usr/bin/my app"));
    }

    #[test]
    fn test_malformed_inputs() {
        assert!(DesktopEntry::parse("Name=x\n[Desktop Entry]\n").is_err());
        assert!(DesktopEntry::parse("[Desktop Entry\nName=x\n").is_err());
        assert!(DesktopEntry::parse("[Desktop Entry]\nName\n").is_err());
        assert!(DesktopEntry::parse("[Desktop Entry]\nName=a\nName=b\n").is_err());
        assert!(DesktopEntry::parse("[Other]\nName=a\n").is_err());
    }
}
