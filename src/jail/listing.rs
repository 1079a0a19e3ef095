//! jls(8) output parsing
//!
//! The enumerate command is run as `jls -h jid name ip4.addr path`, which
//! prints a header row followed by one whitespace-separated row per jail.

use crate::error::Error;
use serde::Serialize;
use std::path::PathBuf;

/// Arguments passed to the enumerate command
pub const LIST_ARGS: &[&str] = &["-h", "jid", "name", "ip4.addr", "path"];

const FIELDS: usize = 4;

/// One active jail as reported by the host
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JailSummary {
    pub id: i32,
    pub name: String,
    pub ipv4: Option<String>,
    pub path: PathBuf,
}

/// Parsed rows plus the rows that could not be parsed
#[derive(Debug, Default)]
pub struct Listing {
    pub jails: Vec<JailSummary>,
    pub errors: Vec<Error>,
}

impl Listing {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Parse a listing, keeping well-formed rows when others are malformed
pub fn parse(output: &str) -> Listing {
    let mut listing = Listing::default();

    for (idx, row) in output.lines().enumerate().skip(1) {
        if row.trim().is_empty() {
            continue;
        }
        match parse_row(row) {
            Ok(summary) => listing.jails.push(summary),
            Err(reason) => {
                tracing::warn!(line = idx + 1, %reason, "skipping listing row");
                listing.errors.push(Error::ListingRow {
                    line: idx + 1,
                    row: row.to_string(),
                    reason,
                });
            }
        }
    }

    listing
}

fn parse_row(row: &str) -> std::result::Result<JailSummary, String> {
    let fields: Vec<&str> = row.split_whitespace().collect();
    if fields.len() < FIELDS {
        return Err(format!(
            "expected {} fields, found {}",
            FIELDS,
            fields.len()
        ));
    }

    let id = fields[0]
        .parse::<i32>()
        .map_err(|e| format!("invalid jail ID '{}': {}", fields[0], e))?;

    let ipv4 = match fields[2] {
        "-" | "" => None,
        addr => Some(addr.to_string()),
    };

    Ok(JailSummary {
        id,
        name: fields[1].to_string(),
        ipv4,
        // Paths containing spaces span the remaining fields
        path: PathBuf::from(fields[3..].join(" ")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
jid name ip4.addr path
1 web1 10.0.0.5 /jails/web1
7 db - /jails/db
";

    #[test]
    fn test_parse_table() {
        let listing = parse(TABLE);
        assert!(listing.is_complete());
        assert_eq!(
            listing.jails,
            vec![
                JailSummary {
                    id: 1,
                    name: "web1".into(),
                    ipv4: Some("10.0.0.5".into()),
                    path: "/jails/web1".into(),
                },
                JailSummary {
                    id: 7,
                    name: "db".into(),
                    ipv4: None,
                    path: "/jails/db".into(),
                },
            ]
        );
    }

    #[test]
    fn test_header_only() {
        let listing = parse("jid name ip4.addr path\n");
        assert!(listing.jails.is_empty());
        assert!(listing.is_complete());
        assert!(parse("").jails.is_empty());
    }

    #[test]
    fn test_partial_success() {
        let output = "\
jid name ip4.addr path
1 web1 10.0.0.5 /jails/web1
2 broken
x api 10.0.0.7 /jails/api
3 cache 10.0.0.8,10.0.0.9 /jails/cache
";
        let listing = parse(output);

        let names: Vec<_> = listing.jails.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["web1", "cache"]);
        assert_eq!(listing.jails[1].ipv4.as_deref(), Some("10.0.0.8,10.0.0.9"));

        assert_eq!(listing.errors.len(), 2);
        assert!(matches!(listing.errors[0], Error::ListingRow { line: 3, .. }));
        assert!(matches!(listing.errors[1], Error::ListingRow { line: 4, .. }));
        assert!(listing.errors.iter().all(Error::is_parse));
    }

    #[test]
    fn test_path_with_spaces() {
        let listing = parse("jid name ip4.addr path\n4 odd - /jails/my jail\n");
        assert_eq!(listing.jails[0].path, PathBuf::from("/jails/my jail"));
    }
}
