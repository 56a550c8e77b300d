// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Break and continue target tracking.

use crate::compiler::bytecode::Label;
use crate::error::ErrorKind;

/// Where a `break` or `continue` lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpTarget {
    /// Label to jump to
    pub label: Label,
    /// Frames active at the target
    pub env_depth: u32,
    /// Finally contexts active when the target was pushed
    pub finally_depth: usize,
}

/// What kind of statement an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Iteration statement
    Loop,
    /// Switch statement
    Switch,
    /// Any other labeled statement
    Plain,
}

/// One entry of the tracker stack.
#[derive(Debug, Clone)]
pub struct LoopLabelEntry {
    /// Statement kind
    pub kind: EntryKind,
    /// Labels attached to the statement
    pub labels: Vec<String>,
    /// Target for `break`
    pub break_target: JumpTarget,
    /// Target for `continue`, loops only
    pub continue_target: Option<JumpTarget>,
    /// Whether each iteration gets a new environment
    pub fresh_frame: bool,
}

/// Stack of enclosing breakable statements within one function.
#[derive(Debug, Default)]
pub struct LoopLabelTracker {
    entries: Vec<LoopLabelEntry>,
}

impl LoopLabelTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    fn check_labels(&self, labels: &[String]) -> Result<(), ErrorKind> {
        for (i, label) in labels.iter().enumerate() {
            let enclosing = self.entries.iter().any(|e| e.labels.contains(label));
            if enclosing || labels[..i].contains(label) {
                return Err(ErrorKind::DuplicateLabel { label: label.clone() });
            }
        }
        Ok(())
    }

    /// Pushes a loop.
    pub fn push_loop(
        &mut self,
        break_target: JumpTarget,
        continue_target: JumpTarget,
        labels: Vec<String>,
        fresh_frame: bool,
    ) -> Result<(), ErrorKind> {
        self.check_labels(&labels)?;
        self.entries.push(LoopLabelEntry {
            kind: EntryKind::Loop,
            labels,
            break_target,
            continue_target: Some(continue_target),
            fresh_frame,
        });
        Ok(())
    }

    /// Pushes a switch.
    pub fn push_switch(&mut self, break_target: JumpTarget, labels: Vec<String>) -> Result<(), ErrorKind> {
        self.check_labels(&labels)?;
        self.entries.push(LoopLabelEntry {
            kind: EntryKind::Switch,
            labels,
            break_target,
            continue_target: None,
            fresh_frame: false,
        });
        Ok(())
    }

    /// Pushes a labeled non-iteration statement.
    pub fn push_plain_label(&mut self, labels: Vec<String>, break_target: JumpTarget) -> Result<(), ErrorKind> {
        self.check_labels(&labels)?;
        self.entries.push(LoopLabelEntry {
            kind: EntryKind::Plain,
            labels,
            break_target,
            continue_target: None,
            fresh_frame: false,
        });
        Ok(())
    }

    /// Pops the innermost entry.
    pub fn pop(&mut self) -> Option<LoopLabelEntry> {
        self.entries.pop()
    }

    /// Resolves a `break`.
    pub fn resolve_break(&self, label: Option<&str>) -> Result<JumpTarget, ErrorKind> {
        match label {
            None => self
                .entries
                .iter()
                .rev()
                .find(|e| e.kind != EntryKind::Plain)
                .map(|e| e.break_target)
                .ok_or(ErrorKind::IllegalBreak),
            Some(name) => self
                .find_labeled(name)
                .map(|e| e.break_target)
                .ok_or_else(|| ErrorKind::UnresolvedLabel { label: name.to_string() }),
        }
    }

    /// Resolves a `continue`.
    pub fn resolve_continue(&self, label: Option<&str>) -> Result<JumpTarget, ErrorKind> {
        match label {
            None => self
                .entries
                .iter()
                .rev()
                .find(|e| e.kind == EntryKind::Loop)
                .and_then(|e| e.continue_target)
                .ok_or(ErrorKind::IllegalContinue { label: None }),
            Some(name) => {
                let entry = self
                    .find_labeled(name)
                    .ok_or_else(|| ErrorKind::UnresolvedLabel { label: name.to_string() })?;
                entry.continue_target.ok_or_else(|| ErrorKind::IllegalContinue {
                    label: Some(name.to_string()),
                })
            }
        }
    }

    fn find_labeled(&self, name: &str) -> Option<&LoopLabelEntry> {
        self.entries.iter().rev().find(|e| e.labels.iter().any(|l| l == name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(n: u32) -> JumpTarget {
        JumpTarget {
            label: Label(n),
            env_depth: 0,
            finally_depth: 0,
        }
    }

    #[test]
    fn test_unlabeled_continue_skips_plain_labels() {
        let mut t = LoopLabelTracker::new();
        t.push_loop(target(1), target(2), vec![], false).unwrap();
        t.push_plain_label(vec!["blk".into()], target(3)).unwrap();
        assert_eq!(t.resolve_continue(None).unwrap().label, Label(2));
        assert_eq!(t.resolve_break(None).unwrap().label, Label(1));
        assert_eq!(t.resolve_break(Some("blk")).unwrap().label, Label(3));
    }

    #[test]
    fn test_unlabeled_continue_targets_innermost_loop() {
        let mut t = LoopLabelTracker::new();
        t.push_loop(target(1), target(2), vec!["outer".into()], false).unwrap();
        t.push_switch(target(3), vec![]).unwrap();
        t.push_loop(target(4), target(5), vec![], false).unwrap();
        assert_eq!(t.resolve_continue(None).unwrap().label, Label(5));
        assert_eq!(t.resolve_continue(Some("outer")).unwrap().label, Label(2));
        t.pop();
        // Inside the switch only: break hits the switch, continue the loop.
        assert_eq!(t.resolve_break(None).unwrap().label, Label(3));
        assert_eq!(t.resolve_continue(None).unwrap().label, Label(2));
    }

    #[test]
    fn test_errors() {
        let mut t = LoopLabelTracker::new();
        assert_eq!(t.resolve_break(None), Err(ErrorKind::IllegalBreak));
        assert_eq!(t.resolve_continue(None), Err(ErrorKind::IllegalContinue { label: None }));

        t.push_plain_label(vec!["a".into()], target(1)).unwrap();
        assert_eq!(
            t.resolve_continue(Some("a")),
            Err(ErrorKind::IllegalContinue {
                label: Some("a".into())
            })
        );
        assert_eq!(
            t.resolve_continue(Some("b")),
            Err(ErrorKind::UnresolvedLabel { label: "b".into() })
        );
        assert_eq!(
            t.resolve_break(Some("b")),
            Err(ErrorKind::UnresolvedLabel { label: "b".into() })
        );
        assert_eq!(t.resolve_break(None), Err(ErrorKind::IllegalBreak));
    }

    #[test]
    fn test_duplicate_labels() {
        let mut t = LoopLabelTracker::new();
        t.push_plain_label(vec!["a".into()], target(1)).unwrap();
        assert_eq!(
            t.push_loop(target(2), target(3), vec!["a".into()], false),
            Err(ErrorKind::DuplicateLabel { label: "a".into() })
        );
        assert!(t.push_switch(target(4), vec!["b".into(), "b".into()]).is_err());
        // Sibling reuse after pop is fine.
        t.pop();
        assert!(t.push_plain_label(vec!["a".into()], target(5)).is_ok());
    }
}
