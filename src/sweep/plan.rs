// src/sweep/plan.rs - Pan angle plan and the order it is walked in
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("Step count must be >= 3, got {0}")]
    TooFewSteps(u32),
    #[error("Range {start}..{stop} is too narrow for {steps} steps")]
    ZeroStep { start: i32, stop: i32, steps: u32 },
    #[error("Plan has only {0} angles; at least 3 are required")]
    TooShort(usize),
}

/// Ordered pan angles from `start` toward `stop`, `stop` excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanPlan {
    start: i32,
    stop: i32,
    step: i32,
    angles: Vec<i32>,
}

impl PanPlan {
    /// Split `start..stop` into `steps` integer increments.
    ///
    /// The increment is `(stop - start) / steps` rounded half to even, so the
    /// plan may cover slightly more or less than the requested range; see
    /// [`PanPlan::residual`].
    pub fn build(start: i32, stop: i32, steps: u32) -> Result<Self, PlanError> {
        if steps < 3 {
            return Err(PlanError::TooFewSteps(steps));
        }
        let span = f64::from(stop) - f64::from(start);
        let step = (span / f64::from(steps)).round_ties_even() as i32;
        if step == 0 {
            return Err(PlanError::ZeroStep { start, stop, steps });
        }

        let mut angles = Vec::with_capacity(steps as usize + 1);
        let mut next = Some(start);
        while let Some(angle) = next {
            if (step > 0 && angle >= stop) || (step < 0 && angle <= stop) {
                break;
            }
            angles.push(angle);
            next = angle.checked_add(step);
        }
        if angles.len() < 3 {
            return Err(PlanError::TooShort(angles.len()));
        }

        Ok(Self { start, stop, step, angles })
    }

    pub fn angles(&self) -> &[i32] {
        &self.angles
    }

    pub fn get(&self, index: usize) -> Option<i32> {
        self.angles.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.angles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.angles.is_empty()
    }

    pub fn step(&self) -> i32 {
        self.step
    }

    /// Degrees covered by `len` increments of `step`.
    pub fn coverage(&self) -> i64 {
        i64::from(self.step) * self.angles.len() as i64
    }

    /// Requested range minus coverage. Zero when rounding was exact.
    pub fn residual(&self) -> i64 {
        self.span() - self.coverage()
    }

    /// Requested range, `stop - start`.
    pub fn span(&self) -> i64 {
        i64::from(self.stop) - i64::from(self.start)
    }

    /// `"<len> x <step>° = <coverage>°"`
    pub fn summary(&self) -> String {
        format!("{} x {}° = {}°", self.len(), self.step, self.coverage())
    }

    pub fn walk(&self, oscillate: bool) -> PlanWalker {
        PlanWalker::new(self.len(), oscillate)
    }
}

/// Yields plan indices: forward once, or back and forth forever when
/// oscillating. Turning around steps back to the neighbour of the boundary,
/// so end angles are never visited twice in a row.
#[derive(Debug, Clone)]
pub struct PlanWalker {
    len: usize,
    next: Option<usize>,
    forward: bool,
    oscillate: bool,
}

impl PlanWalker {
    pub fn new(len: usize, oscillate: bool) -> Self {
        Self {
            len,
            next: (len > 0).then_some(0),
            forward: true,
            oscillate,
        }
    }

    fn advance(&self, index: usize, forward: bool) -> Option<usize> {
        if forward {
            Some(index + 1).filter(|&i| i < self.len)
        } else {
            index.checked_sub(1)
        }
    }

    fn successor(&mut self, index: usize) -> Option<usize> {
        if let Some(next) = self.advance(index, self.forward) {
            return Some(next);
        }
        if !self.oscillate {
            return None;
        }
        // Reflect at the boundary and step back toward the interior.
        self.forward = !self.forward;
        self.advance(index, self.forward)
    }
}

impl Iterator for PlanWalker {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let current = self.next?;
        self.next = self.successor(current);
        Some(current)
    }
}
