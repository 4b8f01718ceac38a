//! Static join analysis: which vertices may join, and where filters attach.

use std::sync::Arc;

use hashbrown::HashSet;

use crate::error::{Error, Result};

use super::graph::{Constraint, Var, Vertex};

/// `true` iff the two predicates share at least one variable position.
pub fn can_join(a: &Vertex, b: &Vertex) -> bool {
    a.shares_var_with(b)
}

/// Whether `vertex` can be joined onto `path` without a cross product.
///
/// The join is admissible when `vertex` shares a variable with some vertex
/// of the path directly, or when some available filter becomes fully bound
/// by the path's variables plus those newly contributed by `vertex`; such
/// a filter then acts as the join condition.
///
/// # Errors
///
/// `InvalidArgument` when the path is empty or already contains `vertex`.
pub fn can_join_using_constraints(
    path: &[Arc<Vertex>],
    vertex: &Vertex,
    constraints: &[Arc<dyn Constraint>],
) -> Result<bool> {
    if path.is_empty() {
        return Err(Error::invalid("join path must not be empty"));
    }
    if path.iter().any(|v| v.id() == vertex.id()) {
        return Err(Error::invalid(format!(
            "vertex {} is already part of the path",
            vertex.id()
        )));
    }

    if path.iter().any(|v| can_join(v, vertex)) {
        return Ok(true);
    }

    let mut bound: HashSet<&Var> = path.iter().flat_map(|v| v.vars()).collect();
    bound.extend(vertex.vars());
    Ok(constraints
        .iter()
        .any(|c| c.vars().iter().all(|v| bound.contains(v))))
}

/// Attaches each filter to the earliest path position at which all of its
/// variables are bound.
///
/// `known_bound` seeds the bound set before the first vertex runs. A filter
/// is attached at most once; filters whose variables never become fully
/// bound along the path are attached to the last position when
/// `path_is_complete` (the path is the whole join group, so every filter
/// has to run somewhere) and dropped otherwise. Multiple filters attaching
/// at the same position keep their input order.
pub fn join_graph_constraints(
    path: &[Arc<Vertex>],
    constraints: &[Arc<dyn Constraint>],
    known_bound: &[Var],
    path_is_complete: bool,
) -> Vec<Vec<Arc<dyn Constraint>>> {
    let mut attached = vec![false; constraints.len()];
    let mut bound: HashSet<Var> = known_bound.iter().cloned().collect();
    let mut out: Vec<Vec<Arc<dyn Constraint>>> = vec![Vec::new(); path.len()];

    for (position, vertex) in path.iter().enumerate() {
        bound.extend(vertex.vars().iter().cloned());
        for (i, constraint) in constraints.iter().enumerate() {
            if attached[i] {
                continue;
            }
            if constraint.vars().iter().all(|v| bound.contains(v)) {
                attached[i] = true;
                out[position].push(Arc::clone(constraint));
            }
        }
    }

    if path_is_complete {
        if let Some(last) = out.last_mut() {
            for (i, constraint) in constraints.iter().enumerate() {
                if !attached[i] {
                    attached[i] = true;
                    last.push(Arc::clone(constraint));
                }
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rto::graph::testing::{filter, pred, vertex};

    /// The seven-predicate fixture used across the analysis tests.
    ///
    /// p3 and p4 share no variable; c1 references one variable of each, so
    /// it can bridge them. c2 references a variable no predicate of the
    /// pair binds.
    fn fixture() -> (Vec<Arc<Vertex>>, Vec<Arc<dyn Constraint>>) {
        let vertices = vec![
            vertex(0, pred("p0", &["x0", "x1"]), 100),
            vertex(1, pred("p1", &["x1", "x2"]), 100),
            vertex(2, pred("p2", &["x2", "x3"]), 100),
            vertex(3, pred("p3", &["x4", "x5"]), 100),
            vertex(4, pred("p4", &["x6", "x7"]), 100),
            vertex(5, pred("p5", &["x7", "x8"]), 100),
            vertex(6, pred("p6", &["x3", "x6"]), 100),
        ];
        let constraints: Vec<Arc<dyn Constraint>> = vec![
            filter("c0", &["x2", "x3"]),
            filter("c1", &["x4", "x6"]),
            filter("c2", &["x5", "x8"]),
        ];
        (vertices, constraints)
    }

    #[test]
    fn can_join_is_symmetric() {
        let (v, _) = fixture();
        for a in &v {
            for b in &v {
                assert_eq!(can_join(a, b), can_join(b, a));
            }
        }
    }

    #[test]
    fn constraint_bridges_variable_disjoint_pair() {
        let (v, c) = fixture();
        let p3 = Arc::clone(&v[3]);
        let p4 = &v[4];

        // No shared variable, no filters: cross product only.
        assert!(!can_join_using_constraints(&[Arc::clone(&p3)], p4, &[]).unwrap());
        // c1 {x4, x6} is fully bound by p3 + p4.
        assert!(
            can_join_using_constraints(&[Arc::clone(&p3)], p4, &[Arc::clone(&c[1])]).unwrap()
        );
        // c2 {x5, x8} references x8, bound by neither.
        assert!(
            !can_join_using_constraints(&[Arc::clone(&p3)], p4, &[Arc::clone(&c[2])]).unwrap()
        );
    }

    #[test]
    fn single_vertex_path_matches_direct_join() {
        let (v, _) = fixture();
        for a in &v {
            for b in &v {
                if a.id() == b.id() {
                    continue;
                }
                assert_eq!(
                    can_join_using_constraints(&[Arc::clone(a)], b, &[]).unwrap(),
                    can_join(a, b)
                );
            }
        }
    }

    #[test]
    fn widening_the_filter_set_is_monotone() {
        let (v, c) = fixture();
        let path = [Arc::clone(&v[3])];
        assert!(can_join_using_constraints(&path, &v[4], &c[1..2]).unwrap());
        // Superset of an admissible filter set stays admissible.
        assert!(can_join_using_constraints(&path, &v[4], &c).unwrap());
    }

    #[test]
    fn rejects_empty_path() {
        let (v, _) = fixture();
        assert!(can_join_using_constraints(&[], &v[0], &[]).is_err());
    }

    #[test]
    fn rejects_duplicate_vertex() {
        let (v, _) = fixture();
        let path = [Arc::clone(&v[0]), Arc::clone(&v[1])];
        assert!(can_join_using_constraints(&path, &v[1], &[]).is_err());
    }

    #[test]
    fn attachment_positions_on_concrete_path() {
        let (v, c) = fixture();
        // Path p1, p2, p4, p6, p0, p3, p5.
        let path: Vec<_> = [1, 2, 4, 6, 0, 3, 5]
            .iter()
            .map(|&i| Arc::clone(&v[i]))
            .collect();

        let attached = join_graph_constraints(&path, &c, &[], true);

        let names: Vec<Vec<&str>> = attached
            .iter()
            .map(|slot| {
                slot.iter()
                    .map(|con| {
                        // c0 {x2,x3}, c1 {x4,x6}, c2 {x5,x8}
                        match con.vars()[0].name() {
                            "x2" => "c0",
                            "x4" => "c1",
                            "x5" => "c2",
                            other => panic!("unexpected constraint var {other}"),
                        }
                    })
                    .collect()
            })
            .collect();

        // c0 binds at p2 (pos 1), c1 at p3 (pos 5), c2 at p5 (pos 6).
        assert_eq!(
            names,
            vec![
                Vec::<&str>::new(),
                vec!["c0"],
                vec![],
                vec![],
                vec![],
                vec!["c1"],
                vec!["c2"],
            ]
        );
    }

    #[test]
    fn each_filter_attaches_exactly_once() {
        let (v, c) = fixture();
        let path: Vec<_> = [1, 2, 4, 6, 0, 3, 5]
            .iter()
            .map(|&i| Arc::clone(&v[i]))
            .collect();
        let attached = join_graph_constraints(&path, &c, &[], true);
        let total: usize = attached.iter().map(Vec::len).sum();
        assert_eq!(total, c.len());
    }

    #[test]
    fn incomplete_path_drops_unbindable_filters() {
        let (v, c) = fixture();
        // p3 alone binds {x4, x5}; none of the filters is fully bound.
        let path = [Arc::clone(&v[3])];
        let attached = join_graph_constraints(&path, &c, &[], false);
        assert!(attached[0].is_empty());

        // Complete flag forces the leftovers onto the last position.
        let attached = join_graph_constraints(&path, &c, &[], true);
        assert_eq!(attached[0].len(), 3);
    }

    #[test]
    fn known_bound_variables_seed_the_walk() {
        let (v, c) = fixture();
        // With x3 pre-bound, c0 {x2, x3} attaches as soon as p1 binds x2.
        let path = [Arc::clone(&v[1])];
        let attached = join_graph_constraints(&path, &c[..1], &[Var::new("x3")], false);
        assert_eq!(attached[0].len(), 1);
    }
}
