//! Cycle Collection
//!
//! Tables are reference counted, so a group of tables that only reference
//! each other is never freed by dropping handles. The collector finds such
//! groups by trial deletion: after subtracting the references tables hold to
//! one another, a table with a remaining count is held from outside the
//! table graph (stack, globals handle, native code, embedder). Everything
//! reachable from those tables is live and the rest is cleared.

use std::collections::HashMap;

use tracing::debug;

use super::table::TableRef;

/// Clear every table in `tables` that is reachable only through cycles.
/// Returns how many tables were cleared.
pub(crate) fn collect_cycles(tables: Vec<TableRef>) -> usize {
    let slots: HashMap<usize, usize> = tables
        .iter()
        .enumerate()
        .map(|(slot, table)| (table.addr(), slot))
        .collect();

    // `tables` itself holds one handle to each
    let mut outside: Vec<usize> = tables.iter().map(|t| t.strong_count() - 1).collect();
    let mut roots = vec![false; tables.len()];
    for (slot, table) in tables.iter().enumerate() {
        match table.try_borrow() {
            Some(table) => table.for_each_table(|child| {
                if let Some(&child) = slots.get(&child.addr()) {
                    outside[child] = outside[child].saturating_sub(1);
                }
            }),
            // mutably borrowed right now, so certainly in use
            None => roots[slot] = true,
        }
    }

    let mut live = vec![false; tables.len()];
    let mut pending: Vec<usize> = (0..tables.len())
        .filter(|&slot| roots[slot] || outside[slot] > 0)
        .collect();
    while let Some(slot) = pending.pop() {
        if live[slot] {
            continue;
        }
        live[slot] = true;
        if let Some(table) = tables[slot].try_borrow() {
            table.for_each_table(|child| {
                if let Some(&child) = slots.get(&child.addr()) {
                    if !live[child] {
                        pending.push(child);
                    }
                }
            });
        }
    }

    let mut cleared = 0;
    for (slot, table) in tables.iter().enumerate() {
        if live[slot] {
            continue;
        }
        if let Some(mut table) = table.try_borrow_mut() {
            table.clear();
            cleared += 1;
        }
    }
    if cleared > 0 {
        debug!(cleared, tracked = tables.len(), "collected table cycles");
    }
    cleared
}

/// Clear every table in `tables`, breaking all cycles between them
pub(crate) fn release_all(tables: Vec<TableRef>) {
    for table in &tables {
        if let Some(mut table) = table.try_borrow_mut() {
            table.clear();
        }
    }
}
