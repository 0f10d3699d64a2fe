//! Resolution of the workspace roots a build's post-build cleanup covers.

use crate::core::types::{BuildContext, MatrixRole, OutcomeFlags, ParentRef, WorkspaceRoot};

/// Roots to clean, in order, plus any parent reference that could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootPlan {
    pub roots: Vec<WorkspaceRoot>,
    pub unresolved_parent: Option<ParentRef>,
}

/// Compute the roots for `context`.
///
/// Standalone builds and matrix parents clean their own root. A matrix child
/// also cleans the parent's root when `cleanup_matrix_parent` is set. The
/// parent is looked up through `resolve_parent` now, never from a cached copy,
/// since siblings may be mutating it concurrently. A missing workspace
/// contributes nothing.
pub fn plan_roots<F>(context: &BuildContext, flags: &OutcomeFlags, resolve_parent: F) -> RootPlan
where
    F: FnOnce(&ParentRef) -> Option<WorkspaceRoot>,
{
    let mut roots: Vec<WorkspaceRoot> = context.workspace.iter().cloned().collect();
    let mut unresolved_parent = None;

    if let MatrixRole::Child { parent } = &context.matrix_role
        && flags.cleanup_matrix_parent
    {
        match resolve_parent(parent) {
            Some(root) => {
                if !roots.contains(&root) {
                    roots.push(root);
                }
            }
            None => unresolved_parent = Some(parent.clone()),
        }
    }

    RootPlan {
        roots,
        unresolved_parent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child(parent: &str) -> BuildContext {
        BuildContext::new("job/axis=a#1", Some(WorkspaceRoot::new("/ws/child"))).with_matrix_role(
            MatrixRole::Child {
                parent: ParentRef::new(parent),
            },
        )
    }

    fn with_parent_flag() -> OutcomeFlags {
        OutcomeFlags {
            cleanup_matrix_parent: true,
            ..OutcomeFlags::always()
        }
    }

    #[test]
    fn standalone_build_cleans_only_itself() {
        let ctx = BuildContext::new("job#1", Some(WorkspaceRoot::new("/ws/job")));
        let plan = plan_roots(&ctx, &with_parent_flag(), |_| {
            panic!("standalone builds never resolve a parent")
        });
        assert_eq!(plan.roots, vec![WorkspaceRoot::new("/ws/job")]);
        assert_eq!(plan.unresolved_parent, None);
    }

    #[test]
    fn matrix_parent_cleans_only_itself() {
        let ctx = BuildContext::new("job#1", Some(WorkspaceRoot::new("/ws/job")))
            .with_matrix_role(MatrixRole::Parent);
        let plan = plan_roots(&ctx, &with_parent_flag(), |_| None);
        assert_eq!(plan.roots, vec![WorkspaceRoot::new("/ws/job")]);
    }

    #[test]
    fn child_adds_parent_root_when_flag_set() {
        let plan = plan_roots(&child("job#1"), &with_parent_flag(), |parent| {
            assert_eq!(parent.as_str(), "job#1");
            Some(WorkspaceRoot::new("/ws/job"))
        });
        assert_eq!(
            plan.roots,
            vec![WorkspaceRoot::new("/ws/child"), WorkspaceRoot::new("/ws/job")]
        );
    }

    #[test]
    fn child_skips_parent_root_without_flag() {
        let plan = plan_roots(&child("job#1"), &OutcomeFlags::always(), |_| {
            panic!("parent must not be resolved when the flag is off")
        });
        assert_eq!(plan.roots, vec![WorkspaceRoot::new("/ws/child")]);
    }

    #[test]
    fn unresolvable_parent_is_reported_not_fatal() {
        let plan = plan_roots(&child("gone#7"), &with_parent_flag(), |_| None);
        assert_eq!(plan.roots, vec![WorkspaceRoot::new("/ws/child")]);
        assert_eq!(plan.unresolved_parent, Some(ParentRef::new("gone#7")));
    }

    #[test]
    fn shared_root_appears_once() {
        let plan = plan_roots(&child("job#1"), &with_parent_flag(), |_| {
            Some(WorkspaceRoot::new("/ws/child"))
        });
        assert_eq!(plan.roots, vec![WorkspaceRoot::new("/ws/child")]);
    }

    #[test]
    fn missing_own_workspace_contributes_nothing() {
        let mut ctx = child("job#1");
        ctx.workspace = None;
        let plan = plan_roots(&ctx, &with_parent_flag(), |_| Some(WorkspaceRoot::new("/ws/job")));
        assert_eq!(plan.roots, vec![WorkspaceRoot::new("/ws/job")]);
    }
}
