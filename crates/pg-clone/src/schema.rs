//! Schema metadata types and table ordering.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A single-column foreign-key constraint, as enumerated from the source
/// catalog. Represents a directed edge `table -> ref_table`. Multi-column
/// constraints surface as one entry per column pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constraint name.
    pub name: String,

    /// Owning table.
    pub table: String,

    /// Owning column.
    pub column: String,

    /// Referenced table.
    pub ref_table: String,

    /// Referenced column.
    pub ref_column: String,
}

/// Result of ordering tables for processing.
#[derive(Debug, Clone, Default)]
pub struct TableOrder {
    /// All input tables, referenced tables before referencing tables where
    /// the foreign-key graph allows it.
    pub tables: Vec<String>,

    /// Tables in a cross-table dependency cycle. They are still present in
    /// `tables` (appended in catalog order) but no safe relative order
    /// exists for them.
    pub cyclic: Vec<String>,

    /// Tables with a self-referencing foreign key. The edge is ignored for
    /// ordering purposes.
    pub self_referencing: Vec<String>,
}

/// Order tables so that referenced tables come before the tables that
/// reference them, using the foreign-key graph.
///
/// Ties are broken by catalog order, so the output is deterministic for a
/// given input. Tables caught in a cycle are appended last in catalog order
/// and reported in [`TableOrder::cyclic`] rather than silently mis-ordered.
/// If `priority` names a table in the input it is moved to the front
/// afterwards; constraints are dropped for the duration of a run, so the
/// forced position cannot violate integrity even when the priority table has
/// dependencies of its own.
pub fn order_tables(tables: &[String], fks: &[ForeignKey], priority: Option<&str>) -> TableOrder {
    let known: HashSet<&str> = tables.iter().map(String::as_str).collect();

    let mut deps: HashMap<&str, HashSet<&str>> = HashMap::new();
    let mut self_referencing: Vec<String> = Vec::new();

    for table in tables {
        deps.insert(table.as_str(), HashSet::new());
    }

    for fk in fks {
        if !known.contains(fk.table.as_str()) || !known.contains(fk.ref_table.as_str()) {
            continue;
        }
        if fk.table == fk.ref_table {
            if !self_referencing.contains(&fk.table) {
                self_referencing.push(fk.table.clone());
            }
            continue;
        }
        if let Some(set) = deps.get_mut(fk.table.as_str()) {
            set.insert(fk.ref_table.as_str());
        }
    }

    // Kahn's algorithm, scanning in catalog order each round so the result
    // is stable. Whatever never becomes ready is part of a cycle.
    let mut ordered: Vec<String> = Vec::with_capacity(tables.len());
    let mut placed: HashSet<&str> = HashSet::new();

    loop {
        let mut progressed = false;
        for table in tables {
            let name = table.as_str();
            if placed.contains(name) {
                continue;
            }
            let ready = deps
                .get(name)
                .map(|d| d.iter().all(|dep| placed.contains(dep)))
                .unwrap_or(true);
            if ready {
                placed.insert(name);
                ordered.push(table.clone());
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }

    let cyclic: Vec<String> = tables
        .iter()
        .filter(|t| !placed.contains(t.as_str()))
        .cloned()
        .collect();
    ordered.extend(cyclic.iter().cloned());

    if let Some(priority) = priority {
        if let Some(pos) = ordered.iter().position(|t| t == priority) {
            let table = ordered.remove(pos);
            ordered.insert(0, table);
        }
    }

    TableOrder {
        tables: ordered,
        cyclic,
        self_referencing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fk(name: &str, table: &str, column: &str, ref_table: &str, ref_column: &str) -> ForeignKey {
        ForeignKey {
            name: name.into(),
            table: table.into(),
            column: column.into(),
            ref_table: ref_table.into(),
            ref_column: ref_column.into(),
        }
    }

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_user_processed_first() {
        let tables = names(&["Order", "User", "Payment"]);
        let fks = vec![
            fk("Order_userId_fkey", "Order", "userId", "User", "id"),
            fk("Payment_userId_fkey", "Payment", "userId", "User", "id"),
        ];
        let order = order_tables(&tables, &fks, Some("User"));

        assert_eq!(order.tables[0], "User");
        assert_eq!(order.tables.len(), 3);
        assert!(order.tables.contains(&"Order".to_string()));
        assert!(order.tables.contains(&"Payment".to_string()));
        assert!(order.cyclic.is_empty());
    }

    #[test]
    fn test_chain_ordered_by_dependencies() {
        let tables = names(&["types", "groups", "categories"]);
        let fks = vec![
            fk("types_group_fkey", "types", "group_id", "groups", "id"),
            fk("groups_cat_fkey", "groups", "category_id", "categories", "id"),
        ];
        let order = order_tables(&tables, &fks, None);

        let pos = |n: &str| order.tables.iter().position(|t| t == n).unwrap();
        assert!(pos("categories") < pos("groups"));
        assert!(pos("groups") < pos("types"));
    }

    #[test]
    fn test_cycle_is_flagged_and_tables_retained() {
        let tables = names(&["a", "b", "c"]);
        let fks = vec![
            fk("a_b_fkey", "a", "b_id", "b", "id"),
            fk("b_a_fkey", "b", "a_id", "a", "id"),
        ];
        let order = order_tables(&tables, &fks, None);

        assert_eq!(order.tables.len(), 3);
        assert_eq!(order.tables[0], "c");
        assert_eq!(order.cyclic, names(&["a", "b"]));
    }

    #[test]
    fn test_self_reference_ignored_for_ordering() {
        let tables = names(&["market_groups", "types"]);
        let fks = vec![
            fk("mg_parent_fkey", "market_groups", "parent_id", "market_groups", "id"),
            fk("types_mg_fkey", "types", "mg_id", "market_groups", "id"),
        ];
        let order = order_tables(&tables, &fks, None);

        assert_eq!(order.self_referencing, names(&["market_groups"]));
        assert!(order.cyclic.is_empty());
        let pos = |n: &str| order.tables.iter().position(|t| t == n).unwrap();
        assert!(pos("market_groups") < pos("types"));
    }

    #[test]
    fn test_priority_forced_first_without_edges() {
        let tables = names(&["alpha", "beta", "User"]);
        let order = order_tables(&tables, &[], Some("User"));
        assert_eq!(order.tables, names(&["User", "alpha", "beta"]));
    }

    #[test]
    fn test_missing_priority_table_is_not_invented() {
        let tables = names(&["alpha", "beta"]);
        let order = order_tables(&tables, &[], Some("User"));
        assert_eq!(order.tables, names(&["alpha", "beta"]));
    }

    #[test]
    fn test_fk_to_unknown_table_ignored() {
        let tables = names(&["Order"]);
        let fks = vec![fk("Order_userId_fkey", "Order", "userId", "User", "id")];
        let order = order_tables(&tables, &fks, None);
        assert_eq!(order.tables, names(&["Order"]));
    }
}
