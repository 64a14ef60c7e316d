//! The generic rewrite engine (component A, spec §4.D.1). `graph_rewrite`
//! walks a DAG bottom-up, post-order, memoized so shared substructure is
//! visited once, applying every rule in `ruleset` to each node until no
//! rule fires anywhere in the whole tree — a fixed point, not a single
//! pass. Rules are plain closures over a caller-supplied context `C`,
//! not a compiled decision trie (see DESIGN.md for why).
//!
//! The traversal is iterative (explicit stack), not recursive, per the
//! recursion-depth note in spec §5: a graph thousands of nodes deep must
//! not blow the call stack.

use std::collections::HashMap;

use crate::op::UOp;

/// A single rewrite rule: inspect `node` (whose sources have already been
/// rewritten to a fixed point) and either return a replacement or `None`
/// to leave it alone.
pub type Rule<C> = Box<dyn Fn(&UOp, &mut C) -> Option<UOp>>;

pub fn graph_rewrite<C>(root: &UOp, ruleset: &[Rule<C>], ctx: &mut C) -> UOp {
    let mut current = root.clone();
    loop {
        let rewritten = rewrite_bottom_up(&current, ruleset, ctx);
        if rewritten == current {
            return rewritten;
        }
        current = rewritten;
    }
}

fn rewrite_bottom_up<C>(root: &UOp, ruleset: &[Rule<C>], ctx: &mut C) -> UOp {
    let mut memo: HashMap<usize, UOp> = HashMap::new();
    let mut stack: Vec<(UOp, bool)> = vec![(root.clone(), false)];

    while let Some((node, expanded)) = stack.pop() {
        if memo.contains_key(&node.identity()) {
            continue;
        }
        if !expanded {
            stack.push((node.clone(), true));
            for s in node.src() {
                if !memo.contains_key(&s.identity()) {
                    stack.push((s.clone(), false));
                }
            }
        } else {
            let new_src: Vec<UOp> = node.src().iter().map(|s| memo.get(&s.identity()).cloned().unwrap_or_else(|| s.clone())).collect();
            let same_src = new_src.iter().zip(node.src()).all(|(a, b)| a == b);
            let mut rewritten = if same_src { node.clone() } else { node.with_src(new_src) };

            loop {
                let mut fired = false;
                for rule in ruleset {
                    if let Some(replacement) = rule(&rewritten, ctx) {
                        rewritten = replacement;
                        fired = true;
                        break;
                    }
                }
                if !fired {
                    break;
                }
            }
            memo.insert(node.identity(), rewritten);
        }
    }

    memo.remove(&root.identity()).expect("root is always visited")
}
