//! Version parsing and range algebra for dependency constraints.
//!
//! Every constraint is normalized into a single interval over semver
//! ordering:
//! - `min-version` is an inclusive lower bound, `max-version` an inclusive
//!   upper bound
//! - `version-range` uses semver requirement syntax; each comparator
//!   (`=`, `>`, `>=`, `<`, `<=`, `~`, `^`, `*`) covers a convex range, so
//!   their conjunction is the intersection of the comparator intervals
//! - pre-release versions sort by plain semver precedence
//!
//! Two constraints are compatible iff their intervals intersect.

use std::cmp::Ordering;
use std::fmt;

use semver::{Comparator, Op, Version, VersionReq};
use toolgraph_core::dependency::VersionConstraint;

/// Parse a tool version leniently: a leading `v` is ignored and missing
/// minor/patch components are treated as `0` (`3.11` becomes `3.11.0`).
pub fn parse_version(raw: &str) -> Option<Version> {
    let s = raw.trim();
    let s = s.strip_prefix('v').or_else(|| s.strip_prefix('V')).unwrap_or(s);
    if let Ok(v) = Version::parse(s) {
        return Some(v);
    }

    let split_at = s.find(['-', '+']).unwrap_or(s.len());
    let (core, rest) = s.split_at(split_at);
    let parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty() || parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
        return None;
    }
    let mut padded = parts.join(".");
    for _ in parts.len()..3 {
        padded.push_str(".0");
    }
    padded.push_str(rest);
    Version::parse(&padded).ok()
}

/// One end of a [`VersionInterval`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bound {
    pub version: Version,
    pub inclusive: bool,
}

impl Bound {
    pub fn inclusive(version: Version) -> Self {
        Self {
            version,
            inclusive: true,
        }
    }

    pub fn exclusive(version: Version) -> Self {
        Self {
            version,
            inclusive: false,
        }
    }
}

/// A contiguous range of versions; `None` bounds are unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VersionInterval {
    pub lower: Option<Bound>,
    pub upper: Option<Bound>,
}

impl VersionInterval {
    /// The interval containing every version.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn at_least(version: Version) -> Self {
        Self {
            lower: Some(Bound::inclusive(version)),
            upper: None,
        }
    }

    pub fn at_most(version: Version) -> Self {
        Self {
            lower: None,
            upper: Some(Bound::inclusive(version)),
        }
    }

    fn between(lower: Bound, upper: Bound) -> Self {
        Self {
            lower: Some(lower),
            upper: Some(upper),
        }
    }

    /// Normalize a dependency's raw constraint.
    ///
    /// Returns a description of the first unparsable part on failure.
    pub fn from_constraint(constraint: &VersionConstraint) -> Result<Self, String> {
        let mut interval = Self::any();
        if let Some(ref min) = constraint.min_version {
            let v = parse_version(min).ok_or_else(|| format!("invalid min-version '{min}'"))?;
            interval = interval.intersect(&Self::at_least(v));
        }
        if let Some(ref max) = constraint.max_version {
            let v = parse_version(max).ok_or_else(|| format!("invalid max-version '{max}'"))?;
            interval = interval.intersect(&Self::at_most(v));
        }
        if let Some(ref range) = constraint.version_range {
            let req = VersionReq::parse(range)
                .map_err(|e| format!("invalid version-range '{range}': {e}"))?;
            interval = interval.intersect(&Self::from_req(&req));
        }
        Ok(interval)
    }

    /// The interval matched by a semver requirement.
    pub fn from_req(req: &VersionReq) -> Self {
        req.comparators
            .iter()
            .map(comparator_interval)
            .fold(Self::any(), |acc, c| acc.intersect(&c))
    }

    pub fn is_unbounded(&self) -> bool {
        self.lower.is_none() && self.upper.is_none()
    }

    /// The tightest interval contained in both.
    pub fn intersect(&self, other: &Self) -> Self {
        Self {
            lower: tighter_lower(self.lower.as_ref(), other.lower.as_ref()),
            upper: tighter_upper(self.upper.as_ref(), other.upper.as_ref()),
        }
    }

    /// Whether no version can satisfy this interval.
    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Some(lo), Some(hi)) => match lo.version.cmp(&hi.version) {
                Ordering::Greater => true,
                Ordering::Equal => !(lo.inclusive && hi.inclusive),
                Ordering::Less => false,
            },
            _ => false,
        }
    }

    pub fn intersects(&self, other: &Self) -> bool {
        !self.intersect(other).is_empty()
    }

    pub fn contains(&self, version: &Version) -> bool {
        !self.is_below(version) && !self.is_above(version)
    }

    /// `version` lies under the lower bound.
    pub fn is_below(&self, version: &Version) -> bool {
        match self.lower {
            Some(ref lo) => match version.cmp(&lo.version) {
                Ordering::Less => true,
                Ordering::Equal => !lo.inclusive,
                Ordering::Greater => false,
            },
            None => false,
        }
    }

    /// `version` lies over the upper bound.
    pub fn is_above(&self, version: &Version) -> bool {
        match self.upper {
            Some(ref hi) => match version.cmp(&hi.version) {
                Ordering::Greater => true,
                Ordering::Equal => !hi.inclusive,
                Ordering::Less => false,
            },
            None => false,
        }
    }
}

impl fmt::Display for VersionInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.lower {
            Some(ref lo) => write!(f, "{}{}", if lo.inclusive { "[" } else { "(" }, lo.version)?,
            None => f.write_str("(")?,
        }
        f.write_str(", ")?;
        match self.upper {
            Some(ref hi) => write!(f, "{}{}", hi.version, if hi.inclusive { "]" } else { ")" }),
            None => f.write_str(")"),
        }
    }
}

fn tighter_lower(a: Option<&Bound>, b: Option<&Bound>) -> Option<Bound> {
    match (a, b) {
        (None, None) => None,
        (Some(x), None) | (None, Some(x)) => Some(x.clone()),
        (Some(x), Some(y)) => Some(match x.version.cmp(&y.version) {
            Ordering::Greater => x.clone(),
            Ordering::Less => y.clone(),
            Ordering::Equal => Bound {
                version: x.version.clone(),
                inclusive: x.inclusive && y.inclusive,
            },
        }),
    }
}

fn tighter_upper(a: Option<&Bound>, b: Option<&Bound>) -> Option<Bound> {
    match (a, b) {
        (None, None) => None,
        (Some(x), None) | (None, Some(x)) => Some(x.clone()),
        (Some(x), Some(y)) => Some(match x.version.cmp(&y.version) {
            Ordering::Less => x.clone(),
            Ordering::Greater => y.clone(),
            Ordering::Equal => Bound {
                version: x.version.clone(),
                inclusive: x.inclusive && y.inclusive,
            },
        }),
    }
}

fn comparator_interval(c: &Comparator) -> VersionInterval {
    let major = c.major;
    let floor = Version {
        major,
        minor: c.minor.unwrap_or(0),
        patch: c.patch.unwrap_or(0),
        pre: c.pre.clone(),
        build: Default::default(),
    };

    match c.op {
        Op::Exact => match c.patch {
            Some(_) => VersionInterval::between(Bound::inclusive(floor.clone()), Bound::inclusive(floor)),
            None => below(Bound::inclusive(floor), past_precision(c)),
        },
        Op::Greater => match (c.patch, past_precision(c)) {
            (None, Some(next)) => VersionInterval::at_least(next),
            (None, None) => VersionInterval {
                lower: Some(Bound::exclusive(Version::new(u64::MAX, u64::MAX, u64::MAX))),
                upper: None,
            },
            (Some(_), _) => VersionInterval {
                lower: Some(Bound::exclusive(floor)),
                upper: None,
            },
        },
        Op::GreaterEq => VersionInterval::at_least(floor),
        Op::Less => VersionInterval {
            lower: None,
            upper: Some(Bound::exclusive(floor)),
        },
        Op::LessEq => match c.patch {
            Some(_) => VersionInterval::at_most(floor),
            None => VersionInterval {
                lower: None,
                upper: past_precision(c).map(Bound::exclusive),
            },
        },
        Op::Tilde => {
            let upper = match c.minor {
                Some(minor) => minor.checked_add(1).map(|m| Version::new(major, m, 0)),
                None => next_major(major),
            };
            below(Bound::inclusive(floor), upper)
        }
        Op::Caret => {
            let upper = match (major, c.minor, c.patch) {
                (0, Some(0), Some(patch)) => patch.checked_add(1).map(|p| Version::new(0, 0, p)),
                (0, Some(minor), _) => minor.checked_add(1).map(|m| Version::new(0, m, 0)),
                _ => next_major(major),
            };
            below(Bound::inclusive(floor), upper)
        }
        Op::Wildcard => below(Bound::inclusive(floor), past_precision(c)),
        _ => VersionInterval::any(),
    }
}

/// `[lower, upper)`, or unbounded above when `upper` does not exist.
fn below(lower: Bound, upper: Option<Version>) -> VersionInterval {
    VersionInterval {
        lower: Some(lower),
        upper: upper.map(Bound::exclusive),
    }
}

fn next_major(major: u64) -> Option<Version> {
    major.checked_add(1).map(|m| Version::new(m, 0, 0))
}

/// First version past the precision the comparator was written at, if one exists.
fn past_precision(c: &Comparator) -> Option<Version> {
    match (c.minor, c.patch) {
        (Some(minor), Some(patch)) => patch.checked_add(1).map(|p| Version::new(c.major, minor, p)),
        (Some(minor), None) => minor.checked_add(1).map(|m| Version::new(c.major, m, 0)),
        _ => next_major(c.major),
    }
}
