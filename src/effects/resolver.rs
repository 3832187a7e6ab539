//! Selection and ordering of event-driven transitions.
//!
//! Candidates are the nodes of the whole machine handling an event kind. A
//! node is shadowed by any descendant that handles the same kind, active or
//! not. The rest are tried deepest first, ties broken by reverse lexical
//! path order, against a running value that every fired transition updates.

use crate::core::{depth, path_to_dotted, FlatMap, StateValue, Transition, ROOT};

/// What the resolver needs from whoever runs transitions.
pub trait TransitionHost {
    /// Check every guard of `transition`.
    fn eligible(&mut self, transition: &Transition) -> bool;

    /// Run `transition` from `current` and return the value reached.
    fn fire(&mut self, current: &StateValue, transition: &Transition) -> StateValue;
}

/// Nodes of `flat` handling `kind`, shadowed ancestors removed, in the
/// order they are tried.
pub fn candidates<'a>(flat: &'a FlatMap, kind: &str) -> Vec<(&'a str, &'a [Transition])> {
    let handlers: Vec<(&str, &[Transition])> = flat
        .iter()
        .filter_map(|(path, node)| {
            node.on
                .get(kind)
                .filter(|transitions| !transitions.is_empty())
                .map(|transitions| (path.as_str(), transitions.as_slice()))
        })
        .collect();

    let mut kept: Vec<(&str, &[Transition])> = handlers
        .iter()
        .filter(|(path, _)| !handlers.iter().any(|(other, _)| is_descendant(other, path)))
        .copied()
        .collect();

    kept.sort_by(|(a, _), (b, _)| depth(b).cmp(&depth(a)).then_with(|| b.cmp(a)));
    kept
}

fn is_descendant(candidate: &str, ancestor: &str) -> bool {
    if candidate == ancestor {
        return false;
    }
    ancestor == ROOT || candidate.starts_with(&format!("{ancestor}/"))
}

/// Fire the transitions `kind` selects and return the resulting value.
///
/// Unless `force` is set, a candidate only fires while it is part of both
/// `current` and the running value, so a node entered by an earlier
/// candidate does not react to the same event. Each remaining candidate
/// fires its first eligible transition. When nothing fires, `current` is
/// returned unchanged.
pub fn resolve<H: TransitionHost>(
    flat: &FlatMap,
    kind: &str,
    current: &StateValue,
    force: bool,
    host: &mut H,
) -> StateValue {
    let mut value = current.clone();
    for (path, transitions) in candidates(flat, kind) {
        let dotted = path_to_dotted(path);
        if !force && !(current.contains(&dotted) && value.contains(&dotted)) {
            continue;
        }
        if let Some(transition) = transitions.iter().find(|t| host.eligible(t)) {
            value = host.fire(&value, transition);
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{next_value, NodeConfig};

    fn to(target: &str) -> Transition {
        Transition {
            target: Some(target.to_string()),
            ..Default::default()
        }
    }

    fn handling(kind: &str, transitions: Vec<Transition>) -> NodeConfig {
        let mut node = NodeConfig::default();
        node.on.insert(kind.to_string(), transitions);
        node
    }

    #[derive(Default)]
    struct Recorder {
        fired: Vec<Option<String>>,
        blocked: Vec<String>,
    }

    impl TransitionHost for Recorder {
        fn eligible(&mut self, transition: &Transition) -> bool {
            !transition
                .description
                .as_ref()
                .is_some_and(|d| self.blocked.contains(d))
        }

        fn fire(&mut self, current: &StateValue, transition: &Transition) -> StateValue {
            self.fired.push(transition.target.clone());
            next_value(current, transition.target.as_deref())
        }
    }

    #[test]
    fn descendants_shadow_ancestors() {
        let mut flat = FlatMap::new();
        flat.insert("/".to_string(), handling("GO", vec![to("/x")]));
        flat.insert("/a".to_string(), handling("GO", vec![to("/y")]));
        flat.insert("/a/b".to_string(), handling("GO", vec![to("/z")]));
        flat.insert("/c".to_string(), NodeConfig::default());

        let paths: Vec<&str> = candidates(&flat, "GO").iter().map(|(p, _)| *p).collect();
        assert_eq!(paths, vec!["/a/b"]);
    }

    #[test]
    fn ties_resolve_by_reverse_lexical_order() {
        let mut flat = FlatMap::new();
        flat.insert("/p/r1".to_string(), handling("GO", vec![to("/p/r1/x")]));
        flat.insert("/p/r2".to_string(), handling("GO", vec![to("/p/r2/x")]));
        flat.insert("/q".to_string(), handling("GO", vec![to("/q")]));

        let paths: Vec<&str> = candidates(&flat, "GO").iter().map(|(p, _)| *p).collect();
        assert_eq!(paths, vec!["/p/r2", "/p/r1", "/q"]);
    }

    #[test]
    fn first_eligible_transition_fires() {
        let mut blocked = to("/a");
        blocked.description = Some("blocked".to_string());
        let mut flat = FlatMap::new();
        flat.insert("/idle".to_string(), handling("GO", vec![blocked, to("/b")]));

        let mut host = Recorder {
            blocked: vec!["blocked".to_string()],
            ..Default::default()
        };
        let value = resolve(&flat, "GO", &StateValue::leaf("idle"), false, &mut host);
        assert_eq!(value, StateValue::leaf("b"));
        assert_eq!(host.fired, vec![Some("/b".to_string())]);
    }

    #[test]
    fn candidates_outside_running_value_are_skipped() {
        let mut flat = FlatMap::new();
        flat.insert("/b".to_string(), handling("GO", vec![to("/c")]));
        flat.insert("/a".to_string(), handling("GO", vec![to("/b")]));

        // "/b" is tried first but is not active; "/a" then fires.
        let mut host = Recorder::default();
        let value = resolve(&flat, "GO", &StateValue::leaf("a"), false, &mut host);
        assert_eq!(value, StateValue::leaf("b"));
        assert_eq!(host.fired.len(), 1);
    }

    #[test]
    fn inactive_descendant_still_shadows_its_ancestor() {
        let mut flat = FlatMap::new();
        flat.insert("/".to_string(), handling("GO", vec![to("/c")]));
        flat.insert("/b".to_string(), handling("GO", vec![to("/a")]));

        let mut host = Recorder::default();
        let current = StateValue::leaf("a");
        assert_eq!(resolve(&flat, "GO", &current, false, &mut host), current);
        assert!(host.fired.is_empty());
    }

    #[test]
    fn node_entered_during_the_walk_does_not_fire() {
        let mut flat = FlatMap::new();
        flat.insert("/off".to_string(), handling("SWITCH", vec![to("/on")]));
        flat.insert("/on".to_string(), handling("SWITCH", vec![to("/off")]));

        let mut host = Recorder::default();
        let value = resolve(&flat, "SWITCH", &StateValue::leaf("on"), false, &mut host);
        assert_eq!(value, StateValue::leaf("off"));
        assert_eq!(host.fired, vec![Some("/off".to_string())]);
    }

    #[test]
    fn force_ignores_membership() {
        let mut flat = FlatMap::new();
        flat.insert("/b".to_string(), handling("GO", vec![to("/c")]));

        let mut host = Recorder::default();
        let value = resolve(&flat, "GO", &StateValue::leaf("a"), true, &mut host);
        assert_eq!(value, StateValue::leaf("c"));
    }

    #[test]
    fn unhandled_kind_keeps_value() {
        let mut flat = FlatMap::new();
        flat.insert("/a".to_string(), handling("GO", vec![to("/b")]));

        let mut host = Recorder::default();
        let current = StateValue::leaf("a");
        assert_eq!(resolve(&flat, "STOP", &current, false, &mut host), current);
        assert!(host.fired.is_empty());
    }
}
