use std::env;

/// Tuning knobs snapshotted at band/dataset construction.
///
/// `None` leaves the built-in heuristics in charge; `Some` forces the
/// corresponding behaviour on or off. The snapshot is read-only once a
/// band holds it, so a long raster operation never observes a flag
/// changing under it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct RawIoConfig {
    /// Overrides the direct-I/O heuristic of rectangular reads/writes.
    pub one_big_read: Option<bool>,
    /// Overrides the preflight file-size check.
    pub check_file_size: Option<bool>,
}

impl RawIoConfig {
    /// Snapshot from `RAWSTERIO_ONE_BIG_READ` / `RAWSTERIO_CHECK_FILE_SIZE`.
    pub fn from_env() -> Self {
        Self {
            one_big_read: parse_bool(env::var("RAWSTERIO_ONE_BIG_READ").ok().as_deref()),
            check_file_size: parse_bool(env::var("RAWSTERIO_CHECK_FILE_SIZE").ok().as_deref()),
        }
    }
}

fn parse_bool(value: Option<&str>) -> Option<bool> {
    let value = value?;
    match value.to_ascii_uppercase().as_str() {
        "YES" | "TRUE" | "ON" | "1" => Some(true),
        "NO" | "FALSE" | "OFF" | "0" => Some(false),
        other => {
            log::warn!("unrecognized config value {other:?}, ignoring");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_values() {
        assert_eq!(parse_bool(Some("YES")), Some(true));
        assert_eq!(parse_bool(Some("on")), Some(true));
        assert_eq!(parse_bool(Some("1")), Some(true));
        assert_eq!(parse_bool(Some("FALSE")), Some(false));
        assert_eq!(parse_bool(Some("0")), Some(false));
        assert_eq!(parse_bool(Some("maybe")), None);
        assert_eq!(parse_bool(None), None);
    }
}
