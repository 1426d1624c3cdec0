// proxy.rs — Proxy resolution for shared memories and sub-functions
//
// When a callee module accessing a shared resource is instantiated several
// times, every copy but one carries a placeholder proxy port. Resolution
// redirects each call/port edge from a duplicate's proxy to the canonical
// owner's real port, then removes proxies with zero remaining references.
// An explicit worklist (queue of instances pending re-resolution) makes
// the fixed point and its idempotence straightforward to test.
//
// Preconditions: the netlist is fully constructed; every resource of the
//                kind being resolved has a canonical owner.
// Postconditions: no edge of the resolved kind targets a proxy; no
//                 zero-reference proxy of that kind survives.
// Failure modes: a referenced resource without a canonical owner is fatal
//                (`E0300`) — the circuit would be disconnected; the netlist
//                is left untouched in that case.
// Side effects: mutates the netlist in place.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::diag::{codes, DiagLevel, Diagnostic};
use crate::id::{ModuleId, ResourceId};
use crate::netlist::{EdgeTarget, ResourceKind, StructuralNetlist};
use crate::pass::StageCert;

/// Result of one resolution pass.
#[derive(Debug, Default)]
pub struct ProxyResult {
    /// Edges redirected from a proxy to the canonical owner's port.
    pub rewrites: usize,
    /// Proxies removed after their reference count reached zero.
    pub removed: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// Resolve proxies standing in for shared memory channels.
pub fn resolve_memory_proxies(netlist: &mut StructuralNetlist) -> ProxyResult {
    resolve_kind(netlist, ResourceKind::Memory)
}

/// Resolve proxies standing in for shared sub-function modules.
pub fn resolve_function_proxies(netlist: &mut StructuralNetlist) -> ProxyResult {
    resolve_kind(netlist, ResourceKind::Function)
}

fn resolve_kind(netlist: &mut StructuralNetlist, kind: ResourceKind) -> ProxyResult {
    let mut result = ProxyResult::default();

    // canonical owners, and the full set of referenced resources of this
    // kind — checked before any mutation so a failure leaves no damage
    let mut owners: HashMap<ResourceId, ModuleId> = HashMap::new();
    let mut referenced: Vec<ResourceId> = Vec::new();
    for module in netlist.modules() {
        for &r in &module.owns {
            if is_kind(netlist, r, kind) {
                owners.entry(r).or_insert(module.id);
            }
        }
        for proxy in &module.proxies {
            if is_kind(netlist, proxy.resource, kind) && !referenced.contains(&proxy.resource) {
                referenced.push(proxy.resource);
            }
        }
        for edge in &module.edges {
            if let EdgeTarget::Proxy { resource, .. } = edge.target {
                if is_kind(netlist, resource, kind) && !referenced.contains(&resource) {
                    referenced.push(resource);
                }
            }
        }
    }

    for r in &referenced {
        if !owners.contains_key(r) {
            let name = netlist
                .resource(*r)
                .map(|res| res.name.clone())
                .unwrap_or_else(|| format!("resource#{}", r.0));
            result.diagnostics.push(
                Diagnostic::new(
                    DiagLevel::Error,
                    format!(
                        "no canonical owner for shared {} '{}'; the circuit \
                         would be disconnected",
                        kind_label(kind),
                        name
                    ),
                )
                .with_code(codes::E0300)
                .with_subject(name),
            );
        }
    }
    if !result.diagnostics.is_empty() {
        return result;
    }

    // the owner's real port carries the resource's name
    let port_names: HashMap<ResourceId, String> = owners
        .keys()
        .map(|&r| {
            let name = netlist
                .resource(r)
                .map(|res| res.name.clone())
                .unwrap_or_else(|| format!("resource#{}", r.0));
            (r, name)
        })
        .collect();

    // worklist: every instance pending re-resolution, in instantiation
    // order; rewriting enqueues the proxy-holding instance whose reference
    // count just dropped
    let ids = netlist.module_ids();
    let mut queue: VecDeque<ModuleId> = ids.iter().copied().collect();
    let mut queued: HashSet<ModuleId> = ids.into_iter().collect();

    while let Some(id) = queue.pop_front() {
        queued.remove(&id);

        // redirect this instance's proxy edges to the canonical owners
        let mut touched_holders: Vec<ModuleId> = Vec::new();
        if let Some(module) = netlist.module_mut(id) {
            for edge in &mut module.edges {
                let EdgeTarget::Proxy { module: holder, resource } = edge.target else {
                    continue;
                };
                let Some(&owner) = owners.get(&resource) else {
                    continue; // different kind — resolved by its own pass
                };
                edge.target = EdgeTarget::Port {
                    module: owner,
                    port: port_names[&resource].clone(),
                };
                result.rewrites += 1;
                touched_holders.push(holder);
            }
        }

        for holder in touched_holders {
            if queued.insert(holder) {
                queue.push_back(holder);
            }
        }

        // drop this instance's proxies that nothing references any more
        let orphaned: Vec<ResourceId> = {
            let Some(module) = netlist.module(id) else { continue };
            module
                .proxies
                .iter()
                .filter(|p| owners.contains_key(&p.resource))
                .filter(|p| reference_count(netlist, id, p.resource) == 0)
                .map(|p| p.resource)
                .collect()
        };
        if !orphaned.is_empty() {
            let module = netlist.module_mut(id).expect("module vanished");
            module
                .proxies
                .retain(|p| !orphaned.contains(&p.resource));
            result.removed += orphaned.len();
            log::debug!(
                "removed {} orphaned prox{} from instance {}",
                orphaned.len(),
                if orphaned.len() == 1 { "y" } else { "ies" },
                id.0
            );
        }
    }

    result
}

fn is_kind(netlist: &StructuralNetlist, r: ResourceId, kind: ResourceKind) -> bool {
    netlist.resource(r).map(|res| res.kind == kind).unwrap_or(false)
}

fn kind_label(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Memory => "memory",
        ResourceKind::Function => "function",
    }
}

/// Edges anywhere in the netlist still going through `holder`'s proxy for
/// `resource`.
fn reference_count(netlist: &StructuralNetlist, holder: ModuleId, resource: ResourceId) -> usize {
    netlist
        .modules()
        .flat_map(|m| m.edges.iter())
        .filter(|e| {
            matches!(
                e.target,
                EdgeTarget::Proxy { module, resource: r } if module == holder && r == resource
            )
        })
        .count()
}

// ── Verification ────────────────────────────────────────────────────────────

/// Machine-checkable evidence for proxy-resolution postconditions.
#[derive(Debug, Clone)]
pub struct ProxyCert {
    /// P1: every remaining proxy-target edge points at an existing proxy.
    pub p1_edges_have_proxies: bool,
    /// P2: every proxy on a non-owner instance has at least one reference.
    pub p2_no_orphan_proxies: bool,
}

impl StageCert for ProxyCert {
    fn all_pass(&self) -> bool {
        self.p1_edges_have_proxies && self.p2_no_orphan_proxies
    }

    fn obligations(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("P1_edges_have_proxies", self.p1_edges_have_proxies),
            ("P2_no_orphan_proxies", self.p2_no_orphan_proxies),
        ]
    }
}

/// Verify proxy postconditions over the whole netlist.
pub fn verify_proxies(netlist: &StructuralNetlist) -> ProxyCert {
    let mut p1 = true;
    for module in netlist.modules() {
        for edge in &module.edges {
            if let EdgeTarget::Proxy { module: holder, resource } = edge.target {
                let holds = netlist
                    .module(holder)
                    .map(|m| m.proxies.iter().any(|p| p.resource == resource))
                    .unwrap_or(false);
                if !holds {
                    p1 = false;
                }
            }
        }
    }

    let mut p2 = true;
    for module in netlist.modules() {
        for proxy in &module.proxies {
            if module.owns.contains(&proxy.resource) {
                continue;
            }
            if reference_count(netlist, module.id, proxy.resource) == 0 {
                p2 = false;
            }
        }
    }

    ProxyCert {
        p1_edges_have_proxies: p1,
        p2_no_orphan_proxies: p2,
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DEFAULT_LIBRARY, PROXY_LIBRARY, WORK_LIBRARY};
    use crate::netlist::{PortEdge, Proxy};

    /// top wraps an owner and two duplicated callees, each holding a proxy
    /// for the owner's memory; top's call edges go through the proxies.
    fn duplicated_memory_netlist() -> (StructuralNetlist, ModuleId, ResourceId) {
        let mut n = StructuralNetlist::new();
        let top = n.new_module("top", "main_dp", WORK_LIBRARY, None);
        let owner = n.new_module("top.mem", "bram_ctrl", DEFAULT_LIBRARY, Some(top));
        let f0 = n.new_module("top.f_0", "callee", DEFAULT_LIBRARY, Some(top));
        let f1 = n.new_module("top.f_1", "callee", DEFAULT_LIBRARY, Some(top));
        let mem = n.new_resource("mem0", ResourceKind::Memory);
        n.module_mut(owner).unwrap().owns.push(mem);
        for f in [f0, f1] {
            n.module_mut(f).unwrap().proxies.push(Proxy {
                resource: mem,
                port_name: "mem0_proxy".to_string(),
            });
        }
        n.module_mut(top).unwrap().edges.push(PortEdge {
            from_port: "call0".to_string(),
            target: EdgeTarget::Proxy {
                module: f0,
                resource: mem,
            },
        });
        n.module_mut(top).unwrap().edges.push(PortEdge {
            from_port: "call1".to_string(),
            target: EdgeTarget::Proxy {
                module: f1,
                resource: mem,
            },
        });
        (n, owner, mem)
    }

    #[test]
    fn duplicates_redirect_to_canonical_owner() {
        let (mut n, owner, _mem) = duplicated_memory_netlist();
        let result = resolve_memory_proxies(&mut n);
        assert!(result.diagnostics.is_empty());
        assert_eq!(result.rewrites, 2);
        assert_eq!(result.removed, 2);

        let top = n.top().unwrap();
        for edge in &n.module(top).unwrap().edges {
            assert_eq!(
                edge.target,
                EdgeTarget::Port {
                    module: owner,
                    port: "mem0".to_string(),
                }
            );
        }
        let cert = verify_proxies(&n);
        assert!(cert.all_pass(), "obligations: {:?}", cert.obligations());
    }

    #[test]
    fn second_run_is_a_no_op() {
        let (mut n, _, _) = duplicated_memory_netlist();
        resolve_memory_proxies(&mut n);
        let again = resolve_memory_proxies(&mut n);
        assert_eq!(again.rewrites, 0);
        assert_eq!(again.removed, 0);
        assert!(again.diagnostics.is_empty());
    }

    #[test]
    fn missing_owner_is_fatal_and_mutation_free() {
        let mut n = StructuralNetlist::new();
        let top = n.new_module("top", "main_dp", WORK_LIBRARY, None);
        let f0 = n.new_module("top.f_0", "callee", PROXY_LIBRARY, Some(top));
        let mem = n.new_resource("mem_orphan", ResourceKind::Memory);
        n.module_mut(f0).unwrap().proxies.push(Proxy {
            resource: mem,
            port_name: "p".to_string(),
        });
        n.module_mut(top).unwrap().edges.push(PortEdge {
            from_port: "call0".to_string(),
            target: EdgeTarget::Proxy {
                module: f0,
                resource: mem,
            },
        });

        let result = resolve_memory_proxies(&mut n);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].code, Some(codes::E0300));
        assert_eq!(result.diagnostics[0].subject.as_deref(), Some("mem_orphan"));
        // nothing rewritten, nothing removed
        assert_eq!(result.rewrites, 0);
        assert_eq!(n.module(f0).unwrap().proxies.len(), 1);
        assert!(matches!(
            n.module(top).unwrap().edges[0].target,
            EdgeTarget::Proxy { .. }
        ));
    }

    #[test]
    fn memory_pass_leaves_function_proxies_alone() {
        let mut n = StructuralNetlist::new();
        let top = n.new_module("top", "main_dp", WORK_LIBRARY, None);
        let callee_owner = n.new_module("top.g", "g_impl", DEFAULT_LIBRARY, Some(top));
        let f0 = n.new_module("top.f_0", "callee", DEFAULT_LIBRARY, Some(top));
        let g = n.new_resource("g", ResourceKind::Function);
        n.module_mut(callee_owner).unwrap().owns.push(g);
        n.module_mut(f0).unwrap().proxies.push(Proxy {
            resource: g,
            port_name: "g_proxy".to_string(),
        });
        n.module_mut(top).unwrap().edges.push(PortEdge {
            from_port: "call_g".to_string(),
            target: EdgeTarget::Proxy {
                module: f0,
                resource: g,
            },
        });

        let mem_pass = resolve_memory_proxies(&mut n);
        assert_eq!(mem_pass.rewrites, 0);
        assert_eq!(n.module(f0).unwrap().proxies.len(), 1);

        let fn_pass = resolve_function_proxies(&mut n);
        assert_eq!(fn_pass.rewrites, 1);
        assert_eq!(fn_pass.removed, 1);
    }

    #[test]
    fn late_referenced_proxy_is_removed_via_worklist() {
        // the proxy holder precedes the caller in instantiation order, so
        // its first visit still sees a live reference; the rewrite must
        // re-enqueue it
        let mut n = StructuralNetlist::new();
        let top = n.new_module("top", "main_dp", WORK_LIBRARY, None);
        let f0 = n.new_module("top.f_0", "callee", DEFAULT_LIBRARY, Some(top));
        let owner = n.new_module("top.mem", "bram_ctrl", DEFAULT_LIBRARY, Some(top));
        let caller = n.new_module("top.main", "caller", DEFAULT_LIBRARY, Some(top));
        let mem = n.new_resource("mem0", ResourceKind::Memory);
        n.module_mut(owner).unwrap().owns.push(mem);
        n.module_mut(f0).unwrap().proxies.push(Proxy {
            resource: mem,
            port_name: "mem0_proxy".to_string(),
        });
        n.module_mut(caller).unwrap().edges.push(PortEdge {
            from_port: "call0".to_string(),
            target: EdgeTarget::Proxy {
                module: f0,
                resource: mem,
            },
        });

        let result = resolve_memory_proxies(&mut n);
        assert_eq!(result.rewrites, 1);
        assert_eq!(result.removed, 1);
        assert!(n.module(f0).unwrap().proxies.is_empty());
        assert!(verify_proxies(&n).all_pass());
    }

    #[test]
    fn verifier_flags_dangling_edge_and_orphan_proxy() {
        let mut n = StructuralNetlist::new();
        let top = n.new_module("top", "main_dp", WORK_LIBRARY, None);
        let f0 = n.new_module("top.f_0", "callee", DEFAULT_LIBRARY, Some(top));
        let mem = n.new_resource("mem0", ResourceKind::Memory);
        // edge to a proxy f0 does not hold
        n.module_mut(top).unwrap().edges.push(PortEdge {
            from_port: "call0".to_string(),
            target: EdgeTarget::Proxy {
                module: f0,
                resource: mem,
            },
        });
        let cert = verify_proxies(&n);
        assert!(!cert.p1_edges_have_proxies);

        // now give f0 the proxy but drop the edge: orphaned proxy
        n.module_mut(f0).unwrap().proxies.push(Proxy {
            resource: mem,
            port_name: "p".to_string(),
        });
        n.module_mut(top).unwrap().edges.clear();
        let cert = verify_proxies(&n);
        assert!(cert.p1_edges_have_proxies);
        assert!(!cert.p2_no_orphan_proxies);
    }
}
