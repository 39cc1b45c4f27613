//! Strongly connected components over a subset of the graph.

use crate::NodeId;

/// Tarjan's algorithm restricted to nodes where `included[id]` is set.
///
/// Iterative so deep dependency chains cannot overflow the stack. Components
/// come out in reverse topological order of the condensation.
pub(crate) fn strongly_connected(
    roots: &[NodeId],
    dependents: &[Vec<NodeId>],
    included: &[bool],
) -> Vec<Vec<NodeId>> {
    const UNVISITED: usize = usize::MAX;

    let n = dependents.len();
    let mut index = vec![UNVISITED; n];
    let mut low = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<NodeId> = Vec::new();
    let mut counter = 0usize;
    let mut components = Vec::new();

    for &root in roots {
        if index[root] != UNVISITED {
            continue;
        }
        index[root] = counter;
        low[root] = counter;
        counter += 1;
        stack.push(root);
        on_stack[root] = true;
        let mut calls: Vec<(NodeId, usize)> = vec![(root, 0)];

        while let Some(frame) = calls.last_mut() {
            let v = frame.0;
            if frame.1 < dependents[v].len() {
                let w = dependents[v][frame.1];
                frame.1 += 1;
                if !included[w] {
                    continue;
                }
                if index[w] == UNVISITED {
                    index[w] = counter;
                    low[w] = counter;
                    counter += 1;
                    stack.push(w);
                    on_stack[w] = true;
                    calls.push((w, 0));
                } else if on_stack[w] {
                    low[v] = low[v].min(index[w]);
                }
                continue;
            }

            calls.pop();
            if let Some(&(parent, _)) = calls.last() {
                low[parent] = low[parent].min(low[v]);
            }
            if low[v] == index[v] {
                let mut component = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                components.push(component);
            }
        }
    }

    components
}
