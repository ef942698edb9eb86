use papilio_link::Mismatch;
use serde::Serialize;
use std::fmt;

/// Only the first few mismatches of a scenario are kept.
pub const MAX_RECORDED_MISMATCHES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MismatchRecord {
    pub index: usize,
    pub expected: u32,
    pub received: u32,
}

impl From<Mismatch> for MismatchRecord {
    fn from(m: Mismatch) -> Self {
        Self {
            index: m.index,
            expected: m.expected,
            received: m.received,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub passed: usize,
    pub failed: usize,
    pub mismatches: Vec<MismatchRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kbytes_per_sec: Option<f64>,
}

impl ScenarioReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: 0,
            failed: 0,
            mismatches: Vec::new(),
            kbytes_per_sec: None,
        }
    }

    /// Count one check; failures are recorded up to the limit.
    pub fn check(&mut self, index: usize, expected: u32, received: u32) {
        if expected == received {
            self.passed += 1;
        } else {
            self.record(MismatchRecord {
                index,
                expected,
                received,
            });
        }
    }

    /// Fold in a batch compare over `checked` elements.
    pub fn absorb(&mut self, checked: usize, mismatches: Vec<Mismatch>) {
        self.passed += checked.saturating_sub(mismatches.len());
        for m in mismatches {
            self.record(m.into());
        }
    }

    fn record(&mut self, mismatch: MismatchRecord) {
        if self.failed == 0 {
            log::warn!(
                "{}: first error at [{}]: got {:#x} (expected {:#x})",
                self.name,
                mismatch.index,
                mismatch.received,
                mismatch.expected
            );
        }
        self.failed += 1;
        if self.mismatches.len() < MAX_RECORDED_MISMATCHES {
            self.mismatches.push(mismatch);
        }
    }

    pub fn passed_all(&self) -> bool {
        self.failed == 0 && self.passed > 0
    }
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.passed_all() { "PASSED" } else { "FAILED" };
        write!(f, "{mark} {}: {} passed, {} failed", self.name, self.passed, self.failed)?;
        if let Some(rate) = self.kbytes_per_sec {
            write!(f, " ({rate:.2} KB/s)")?;
        }
        for m in &self.mismatches {
            write!(
                f,
                "\n  [{:3}] got {:#04x}, expected {:#04x}",
                m.index, m.received, m.expected
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub reports: Vec<ScenarioReport>,
}

impl Summary {
    pub fn push(&mut self, report: ScenarioReport) {
        self.passed += report.passed;
        self.failed += report.failed;
        self.reports.push(report);
    }

    pub fn success(&self) -> bool {
        !self.reports.is_empty() && self.reports.iter().all(ScenarioReport::passed_all)
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for report in &self.reports {
            writeln!(f, "{report}")?;
        }
        writeln!(f, "=== Test Summary ===")?;
        writeln!(f, "Passed: {}", self.passed)?;
        writeln!(f, "Failed: {}", self.failed)?;
        if self.success() {
            write!(f, "ALL TESTS PASSED")
        } else {
            write!(f, "SOME TESTS FAILED")
        }
    }
}
