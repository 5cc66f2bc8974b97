//! Level planning - groups adjacent steps for display
//!
//! A level is a run of consecutive `parallel` steps, or a single
//! non-parallel step on its own. Levels are a presentation concern: the
//! engine always advances one step at a time.

use crate::core::Step;
use serde::Serialize;

/// A group of adjacent steps shown side by side
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Level<'a> {
    pub steps: Vec<&'a Step>,
}

impl<'a> Level<'a> {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step_numbers(&self) -> Vec<usize> {
        self.steps.iter().map(|s| s.number).collect()
    }

    /// Total number of agents across the level's steps
    pub fn agent_count(&self) -> usize {
        self.steps.iter().map(|s| s.agents.len()).sum()
    }
}

/// Split an ordered step list into levels
pub fn plan_levels(steps: &[Step]) -> Vec<Level<'_>> {
    let mut levels = Vec::new();
    let mut group: Vec<&Step> = Vec::new();

    for step in steps {
        if step.parallel {
            group.push(step);
            continue;
        }
        if !group.is_empty() {
            levels.push(Level {
                steps: std::mem::take(&mut group),
            });
        }
        levels.push(Level { steps: vec![step] });
    }

    if !group.is_empty() {
        levels.push(Level { steps: group });
    }

    levels
}
