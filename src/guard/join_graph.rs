//! Join graph depth
//!
//! Builds an undirected adjacency list over the FROM bindings from the column
//! references in each ON condition and measures hop distance from the first
//! table. A table with no usable edge (cross join, constant ON) hangs directly
//! off the first table.

use crate::sql::FromClause;
use std::collections::{HashMap, HashSet, VecDeque};

/// Largest hop distance from the first FROM table to any joined table.
pub fn join_depth(from: &FromClause) -> usize {
    let bindings: Vec<String> = from
        .tables()
        .enumerate()
        .map(|(i, t)| t.binding().map(|b| b.to_lowercase()).unwrap_or_else(|| format!("#{}", i)))
        .collect();
    let Some(base) = bindings.first() else {
        return 0;
    };

    let mut graph: HashMap<String, HashSet<String>> = HashMap::new();
    for (i, join) in from.joins.iter().enumerate() {
        let this = &bindings[i + 1];
        let Some(on) = &join.on else { continue };
        for col in on.column_refs() {
            let Some(other) = col.table.as_ref().map(|t| t.to_lowercase()) else {
                continue;
            };
            if &other != this && bindings.contains(&other) {
                graph.entry(this.clone()).or_default().insert(other.clone());
                graph.entry(other).or_default().insert(this.clone());
            }
        }
    }

    let distances = bfs(base, &graph);
    bindings
        .iter()
        .skip(1)
        .map(|b| distances.get(b).copied().unwrap_or(1))
        .max()
        .unwrap_or(0)
}

fn bfs(start: &str, graph: &HashMap<String, HashSet<String>>) -> HashMap<String, usize> {
    let mut distances: HashMap<String, usize> = HashMap::new();
    let mut queue = VecDeque::new();
    distances.insert(start.to_string(), 0);
    queue.push_back(start.to_string());

    while let Some(node) = queue.pop_front() {
        let next = distances[&node] + 1;
        if let Some(neighbors) = graph.get(&node) {
            for neighbor in neighbors {
                if !distances.contains_key(neighbor) {
                    distances.insert(neighbor.clone(), next);
                    queue.push_back(neighbor.clone());
                }
            }
        }
    }
    distances
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::parse;

    fn depth(sql: &str) -> usize {
        let q = parse(sql).unwrap();
        join_depth(q.branches[0].from.as_ref().unwrap())
    }

    #[test]
    fn test_star_join_has_depth_one() {
        assert_eq!(depth("SELECT a.x FROM a JOIN b ON a.id = b.a_id JOIN c ON a.id = c.a_id"), 1);
    }

    #[test]
    fn test_chain_join_depth() {
        assert_eq!(
            depth("SELECT a.x FROM a JOIN b ON a.id = b.a_id JOIN c ON b.id = c.b_id JOIN d ON c.id = d.c_id"),
            3
        );
    }

    #[test]
    fn test_single_table_and_cross_join() {
        assert_eq!(depth("SELECT a.x FROM a"), 0);
        assert_eq!(depth("SELECT a.x FROM a, b"), 1);
    }
}
