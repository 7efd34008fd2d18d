//! Port specifications as closed integer intervals.
//!
//! Policy rules treat `"80-90"` and `"90-100"` as overlapping: both include
//! 90. Every comparison in this module uses closed-interval semantics.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Transport protocol of an ingress port or a derived rule.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "TCP")]
    Tcp,
    #[serde(rename = "UDP")]
    Udp,
}

impl Protocol {
    pub const ALL: [Protocol; 2] = [Protocol::Tcp, Protocol::Udp];
}

impl Default for Protocol {
    fn default() -> Self {
        Protocol::Tcp
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("TCP"),
            Protocol::Udp => f.write_str("UDP"),
        }
    }
}

/// An inclusive port interval. `start == end` describes a single port.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    pub fn single(port: u16) -> Self {
        Self {
            start: port,
            end: port,
        }
    }

    /// Closed-interval overlap; ranges touching at an endpoint overlap.
    pub fn overlaps(&self, other: &PortRange) -> bool {
        self.start <= other.end && self.end >= other.start
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ParsePortsError {
    #[error("port specification is empty")]
    Empty,

    #[error("invalid port {0:?}")]
    InvalidPort(String),

    #[error("port range {0}-{1} must be increasing")]
    Decreasing(u16, u16),
}

/// Two ranges of the same protocol that intersect.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{protocol} port ranges {first} and {second} overlap")]
pub struct OverlapError {
    pub protocol: Protocol,
    pub first: PortRange,
    pub second: PortRange,
}

/// Reads a comma-separated list of ports or port ranges.
///
/// Each element is a decimal port or `from-to` with `from <= to`; whitespace
/// around commas is tolerated. An empty specification is an error.
pub fn parse_ranges(s: &str) -> Result<Vec<PortRange>, ParsePortsError> {
    if s.trim().is_empty() {
        return Err(ParsePortsError::Empty);
    }

    let mut ranges = Vec::new();
    for spec in s.split(',') {
        let spec = spec.trim();
        match spec.split_once('-') {
            None => {
                let port = spec
                    .parse::<u16>()
                    .map_err(|_| ParsePortsError::InvalidPort(spec.to_string()))?;
                ranges.push(PortRange::single(port));
            }
            Some((start, end)) => {
                let start = start
                    .trim()
                    .parse::<u16>()
                    .map_err(|_| ParsePortsError::InvalidPort(spec.to_string()))?;
                let end = end
                    .trim()
                    .parse::<u16>()
                    .map_err(|_| ParsePortsError::InvalidPort(spec.to_string()))?;
                if start > end {
                    return Err(ParsePortsError::Decreasing(start, end));
                }
                ranges.push(PortRange::new(start, end));
            }
        }
    }

    Ok(ranges)
}

/// Renders ranges in the canonical comma-separated form.
pub fn format_ranges(ranges: &[PortRange]) -> String {
    let mut out = String::new();
    for (i, range) in ranges.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&range.to_string());
    }
    out
}

/// Detects any pairwise overlap among `ranges`.
///
/// Sorts a copy and sweeps adjacent pairs, so the reported offenders do not
/// depend on input order.
pub fn check_disjoint(ranges: &[PortRange], protocol: Protocol) -> Result<(), OverlapError> {
    let mut sorted = ranges.to_vec();
    sorted.sort();

    for pair in sorted.windows(2) {
        if pair[0].overlaps(&pair[1]) {
            return Err(OverlapError {
                protocol,
                first: pair[0],
                second: pair[1],
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_single_and_lists() {
        assert_eq!(parse_ranges("80").unwrap(), vec![PortRange::single(80)]);
        assert_eq!(
            parse_ranges("80,443").unwrap(),
            vec![PortRange::single(80), PortRange::single(443)]
        );
        assert_eq!(
            parse_ranges("8080-8090").unwrap(),
            vec![PortRange::new(8080, 8090)]
        );
        assert_eq!(
            parse_ranges("80, 8080-8090").unwrap(),
            vec![PortRange::single(80), PortRange::new(8080, 8090)]
        );
    }

    #[test]
    fn parse_rejects_malformed_input() {
        assert_eq!(parse_ranges(""), Err(ParsePortsError::Empty));
        assert_eq!(parse_ranges("   "), Err(ParsePortsError::Empty));
        assert_eq!(
            parse_ranges("invalid"),
            Err(ParsePortsError::InvalidPort("invalid".to_string()))
        );
        assert_eq!(parse_ranges("90-80"), Err(ParsePortsError::Decreasing(90, 80)));
        assert_eq!(
            parse_ranges("70000"),
            Err(ParsePortsError::InvalidPort("70000".to_string()))
        );
    }

    #[test]
    fn zero_is_a_valid_port() {
        assert_eq!(parse_ranges("0").unwrap(), vec![PortRange::single(0)]);
    }

    #[test]
    fn touching_ranges_overlap() {
        let a = PortRange::new(80, 90);
        let b = PortRange::new(90, 100);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
    }

    #[test]
    fn disjoint_ranges_do_not_overlap() {
        let a = PortRange::new(80, 90);
        let b = PortRange::new(91, 100);
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
    }

    #[test]
    fn overlap_is_reflexive() {
        let a = PortRange::new(80, 90);
        assert!(a.overlaps(&a));
    }

    #[test]
    fn check_disjoint_reports_offenders() {
        let err = check_disjoint(
            &[
                PortRange::single(443),
                PortRange::new(75, 85),
                PortRange::single(80),
            ],
            Protocol::Tcp,
        )
        .unwrap_err();
        assert_eq!(err.first, PortRange::new(75, 85));
        assert_eq!(err.second, PortRange::single(80));
    }

    #[test]
    fn check_disjoint_is_order_independent() {
        let forward = [PortRange::single(80), PortRange::new(75, 85)];
        let reverse = [PortRange::new(75, 85), PortRange::single(80)];
        assert_eq!(
            check_disjoint(&forward, Protocol::Tcp),
            check_disjoint(&reverse, Protocol::Tcp)
        );
    }

    #[test]
    fn format_round_trips_canonical_input() {
        for spec in ["80", "80,443", "8080-8090", "80,8080-8090"] {
            let ranges = parse_ranges(spec).unwrap();
            assert_eq!(format_ranges(&ranges), spec);
        }
    }
}
