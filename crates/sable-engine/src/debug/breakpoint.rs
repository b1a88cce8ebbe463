//! The breakpoint table.
//!
//! Owns every breakpoint, resolves source positions to `(program, pc)`
//! pairs by scanning the source map forward from PC 0, and maintains the
//! fast lookup index the pause predicate reads on every instruction.

use crate::compiler::Program;
use crate::source::Position;
use rustc_hash::FxHashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Read-only view of a breakpoint.
#[derive(Debug, Clone)]
pub struct BreakpointInfo {
    /// Stable breakpoint id.
    pub id: u32,
    /// The requested source position (never mutated after creation).
    pub source_pos: Position,
    /// Resolved program counter, if resolution succeeded.
    pub resolved_pc: Option<u32>,
    /// Whether the breakpoint currently fires.
    pub enabled: bool,
    /// Number of times an enabled hit paused execution. Monotonic; survives
    /// disable/enable cycles.
    pub hit_count: u32,
}

struct Breakpoint {
    id: u32,
    source_pos: Position,
    /// `(program id, pc)` once resolved.
    resolved: Option<(u32, u32)>,
    enabled: bool,
    /// Bumped under the predicate's read lock.
    hit: AtomicU32,
}

impl Breakpoint {
    fn info(&self) -> BreakpointInfo {
        BreakpointInfo {
            id: self.id,
            source_pos: self.source_pos.clone(),
            resolved_pc: self.resolved.map(|(_, pc)| pc),
            enabled: self.enabled,
            hit_count: self.hit.load(Ordering::Relaxed),
        }
    }
}

/// Breakpoint storage plus the PC index consulted on the hot path.
pub(crate) struct BreakpointTable {
    table: FxHashMap<u32, Breakpoint>,
    next_id: u32,
    /// `(program id, pc)` → breakpoint id. Entries are indexed regardless of
    /// the enabled flag; the predicate filters on it.
    pc_index: FxHashMap<(u32, u32), u32>,
}

impl BreakpointTable {
    pub(crate) fn new() -> Self {
        Self {
            table: FxHashMap::default(),
            next_id: 1,
            pc_index: FxHashMap::default(),
        }
    }

    /// Allocate a breakpoint; resolve immediately when a program is loaded.
    pub(crate) fn add(&mut self, source_pos: Position, program: Option<&Rc<Program>>) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        let mut bp = Breakpoint {
            id,
            source_pos,
            resolved: None,
            enabled: true,
            hit: AtomicU32::new(0),
        };
        if let Some(root) = program {
            if let Some(target) = resolve_position(&bp.source_pos, root) {
                bp.resolved = Some(target);
                self.pc_index.insert(target, id);
                tracing::debug!(
                    id,
                    program = target.0,
                    pc = target.1,
                    "breakpoint resolved"
                );
            } else {
                tracing::debug!(id, pos = %bp.source_pos, "breakpoint unresolved");
            }
        }
        self.table.insert(id, bp);
        id
    }

    /// Remove a breakpoint and its index entry. False for unknown ids.
    pub(crate) fn remove(&mut self, id: u32) -> bool {
        match self.table.remove(&id) {
            Some(bp) => {
                if let Some(target) = bp.resolved {
                    self.pc_index.remove(&target);
                }
                true
            }
            None => false,
        }
    }

    /// Toggle a breakpoint. Does not re-resolve. False for unknown ids.
    pub(crate) fn set_enabled(&mut self, id: u32, enabled: bool) -> bool {
        match self.table.get_mut(&id) {
            Some(bp) => {
                bp.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Snapshot copies of every breakpoint.
    pub(crate) fn list(&self) -> Vec<BreakpointInfo> {
        let mut out: Vec<BreakpointInfo> = self.table.values().map(|bp| bp.info()).collect();
        out.sort_by_key(|bp| bp.id);
        out
    }

    /// Read-only view of one breakpoint.
    pub(crate) fn info(&self, id: u32) -> Option<BreakpointInfo> {
        self.table.get(&id).map(|bp| bp.info())
    }

    /// Hot-path check: does an enabled breakpoint cover this PC?
    /// Increments the hit count on a hit. Takes `&self` so the predicate can
    /// run under a shared lock.
    pub(crate) fn check_hit(&self, program_id: u32, pc: u32) -> Option<u32> {
        let id = *self.pc_index.get(&(program_id, pc))?;
        let bp = self.table.get(&id)?;
        if !bp.enabled {
            return None;
        }
        bp.hit.fetch_add(1, Ordering::Relaxed);
        Some(id)
    }

    /// Like `check_hit` without the side effect (used by the snapshotter).
    pub(crate) fn lookup(&self, program_id: u32, pc: u32) -> Option<u32> {
        let id = *self.pc_index.get(&(program_id, pc))?;
        let bp = self.table.get(&id)?;
        if bp.enabled {
            Some(id)
        } else {
            None
        }
    }

    /// Retry resolution of every unresolved breakpoint against a newly
    /// installed program.
    pub(crate) fn resolve_pending(&mut self, root: &Rc<Program>) {
        let pending: Vec<u32> = self
            .table
            .values()
            .filter(|bp| bp.resolved.is_none())
            .map(|bp| bp.id)
            .collect();
        for id in pending {
            self.resolve_one(id, root);
        }
    }

    /// Re-resolve every breakpoint whose source matches this program tree.
    /// Called when a program is installed: a recompiled script gets fresh
    /// program ids, so previously resolved breakpoints must move to the new
    /// tree to keep firing. Breakpoints addressing other sources are left
    /// untouched.
    pub(crate) fn resolve_all(&mut self, root: &Rc<Program>) {
        let ids: Vec<u32> = self.table.keys().copied().collect();
        for id in ids {
            self.resolve_one(id, root);
        }
    }

    fn resolve_one(&mut self, id: u32, root: &Rc<Program>) {
        let pos = match self.table.get(&id) {
            Some(bp) => bp.source_pos.clone(),
            None => return,
        };
        if let Some(target) = resolve_position(&pos, root) {
            if let Some(bp) = self.table.get_mut(&id) {
                if let Some(old) = bp.resolved.replace(target) {
                    self.pc_index.remove(&old);
                }
            }
            self.pc_index.insert(target, id);
            tracing::debug!(id, program = target.0, pc = target.1, "breakpoint resolved");
        }
    }
}

/// Scan a program tree for the first instruction mapped to the requested
/// (filename, line). The column is advisory: any column on the line matches.
/// Scans each program forward from PC 0, outermost program first.
fn resolve_position(pos: &Position, root: &Rc<Program>) -> Option<(u32, u32)> {
    let mut found = None;
    crate::compiler::program::walk_programs(root, &mut |prg| {
        if found.is_some() {
            return;
        }
        if &**prg.src.name() != &*pos.filename {
            return;
        }
        for pc in 0..prg.code.len() {
            if let Some(offset) = prg.source_offset(pc) {
                if prg.src.line_of(offset) == pos.line {
                    found = Some((prg.id, pc as u32));
                    return;
                }
            }
        }
    });
    found
}
