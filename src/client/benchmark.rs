//! Worker benchmarking
//!
//! Runs a fixed prime-sum workload through volatile execution so the
//! worker namespace is never touched, then splits the round trip into
//! compute and network time.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Workload; `cycles` is bound by the caller, `elapsed` is read back
pub const BENCHMARK_SOURCE: &str = "start = clock()
total = sum_primes(cycles)
elapsed = clock() - start";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    /// Round trip minus compute time
    pub network_secs: f64,

    /// Time measured on the worker
    pub compute_secs: f64,

    /// Worker lock was held when the benchmark started
    pub busy: bool,
}

impl BenchmarkReport {
    pub fn total_secs(&self) -> f64 {
        self.network_secs + self.compute_secs
    }

    /// Lower is better
    pub fn score(&self, criterion: Criterion) -> f64 {
        match criterion {
            Criterion::Network => self.network_secs,
            Criterion::Compute => self.compute_secs,
            Criterion::Combined => self.total_secs(),
        }
    }
}

/// Which part of a report ranks workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    Network,
    Compute,
    #[default]
    Combined,
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Criterion::Network => "network",
            Criterion::Compute => "compute",
            Criterion::Combined => "combined",
        };
        f.write_str(name)
    }
}

impl FromStr for Criterion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "network" => Ok(Criterion::Network),
            "compute" => Ok(Criterion::Compute),
            "combined" | "both" => Ok(Criterion::Combined),
            other => Err(format!("unknown criterion '{}'", other)),
        }
    }
}

/// Sort ascending by score; ties keep their input order
pub fn rank<T>(mut reports: Vec<(T, BenchmarkReport)>, criterion: Criterion) -> Vec<(T, BenchmarkReport)> {
    reports.sort_by(|(_, a), (_, b)| {
        a.score(criterion)
            .partial_cmp(&b.score(criterion))
            .unwrap_or(Ordering::Equal)
    });
    reports
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(network: f64, compute: f64) -> BenchmarkReport {
        BenchmarkReport {
            network_secs: network,
            compute_secs: compute,
            busy: false,
        }
    }

    #[test]
    fn test_rank_by_criterion() {
        let reports = vec![
            ("a", report(0.5, 0.1)),
            ("b", report(0.1, 0.4)),
            ("c", report(0.2, 0.2)),
        ];

        let by = |c| -> Vec<&str> { rank(reports.clone(), c).into_iter().map(|(k, _)| k).collect() };
        assert_eq!(by(Criterion::Network), vec!["b", "c", "a"]);
        assert_eq!(by(Criterion::Compute), vec!["a", "c", "b"]);
        assert_eq!(by(Criterion::Combined), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_ties_keep_order() {
        let reports = vec![("x", report(0.1, 0.1)), ("y", report(0.1, 0.1))];
        let ranked: Vec<_> = rank(reports, Criterion::Combined).into_iter().map(|(k, _)| k).collect();
        assert_eq!(ranked, vec!["x", "y"]);
    }

    #[test]
    fn test_criterion_parse() {
        assert_eq!("Network".parse::<Criterion>().unwrap(), Criterion::Network);
        assert_eq!("both".parse::<Criterion>().unwrap(), Criterion::Combined);
        assert!("speed".parse::<Criterion>().is_err());
    }
}
