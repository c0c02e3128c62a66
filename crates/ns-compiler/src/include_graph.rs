use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use ns_core::NsError;

use crate::source_parse::ParsedSource;

pub(crate) fn validate_include_graph(
    sources: &BTreeMap<String, ParsedSource>,
) -> Result<(), NsError> {
    for (file_path, source) in sources {
        for include in &source.includes {
            if !sources.contains_key(include) {
                return Err(NsError::new(
                    "INCLUDE_NOT_FOUND",
                    format!(
                        "Include \"{}\" referenced by \"{}\" not found.",
                        include, file_path
                    ),
                ));
            }
        }
    }

    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    enum State {
        Visiting,
        Done,
    }

    fn dfs(
        node: &str,
        sources: &BTreeMap<String, ParsedSource>,
        states: &mut HashMap<String, State>,
        stack: &mut Vec<String>,
    ) -> Result<(), NsError> {
        if let Some(state) = states.get(node) {
            if *state == State::Visiting {
                stack.push(node.to_string());
                let cycle = stack.join(" -> ");
                return Err(NsError::new(
                    "INCLUDE_CYCLE",
                    format!("Include cycle detected: {}", cycle),
                ));
            }
            return Ok(());
        }

        states.insert(node.to_string(), State::Visiting);
        stack.push(node.to_string());

        if let Some(source) = sources.get(node) {
            for include in &source.includes {
                dfs(include, sources, states, stack)?;
            }
        }

        stack.pop();
        states.insert(node.to_string(), State::Done);
        Ok(())
    }

    let mut states: HashMap<String, State> = HashMap::new();
    for file_path in sources.keys() {
        dfs(file_path, sources, &mut states, &mut Vec::new())?;
    }

    Ok(())
}

/// The files whose members are visible from `start`: the file itself, then
/// its transitive includes in breadth-first order.
pub(crate) fn merged_file_order(
    start: &str,
    sources: &BTreeMap<String, ParsedSource>,
) -> Vec<String> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    let mut queue = VecDeque::from([start.to_string()]);

    while let Some(path) = queue.pop_front() {
        if !visited.insert(path.clone()) {
            continue;
        }
        if let Some(source) = sources.get(&path) {
            queue.extend(source.includes.iter().cloned());
        }
        order.push(path);
    }

    order
}

#[cfg(test)]
mod include_graph_tests {
    use super::*;
    use crate::source_parse::parse_sources;

    fn sources(files: &[(&str, &str)]) -> BTreeMap<String, ParsedSource> {
        let map = files
            .iter()
            .map(|(path, text)| (path.to_string(), text.to_string()))
            .collect::<BTreeMap<_, _>>();
        parse_sources(&map, &mut Vec::new()).expect("sources should parse")
    }

    #[test]
    fn missing_include_is_reported() {
        let parsed = sources(&[("main.nss", "#include \"missing.nss\"\nfunction F() {}")]);
        let error = validate_include_graph(&parsed).expect_err("missing include should fail");
        assert_eq!(error.code, "INCLUDE_NOT_FOUND");
        assert!(error.message.contains("missing.nss"));
    }

    #[test]
    fn include_cycle_is_reported() {
        let parsed = sources(&[
            ("a.nss", "#include \"b.nss\"\nfunction A() {}"),
            ("b.nss", "#include \"a.nss\"\nfunction B() {}"),
        ]);
        let error = validate_include_graph(&parsed).expect_err("cycle should fail");
        assert_eq!(error.code, "INCLUDE_CYCLE");
        assert!(error.message.contains("a.nss -> b.nss -> a.nss"));
    }

    #[test]
    fn merged_order_is_breadth_first() {
        let parsed = sources(&[
            ("main.nss", "#include \"a.nss\"\n#include \"b.nss\"\nfunction M() {}"),
            ("a.nss", "#include \"c.nss\"\nfunction A() {}"),
            ("b.nss", "#include \"c.nss\"\nfunction B() {}"),
            ("c.nss", "function C() {}"),
        ]);
        validate_include_graph(&parsed).expect("graph should be valid");
        assert_eq!(
            merged_file_order("main.nss", &parsed),
            vec!["main.nss", "a.nss", "b.nss", "c.nss"]
        );
    }
}
