//! Environment variables: reconciliation of server-declared variables with
//! local overrides, and `{{name}}` interpolation.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::models::EnvironmentSchema;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([^}]+)\}\}").expect("placeholder pattern is valid"));

/// A named value available for interpolation
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedVariable {
    pub name: String,
    pub value: String,
    pub editable: bool,
    /// `false` when the server declared this variable
    pub local: bool,
}

impl ResolvedVariable {
    /// The add-row: editable, local, no name and no value.
    pub fn empty() -> Self {
        ResolvedVariable {
            name: String::new(),
            value: String::new(),
            editable: true,
            local: true,
        }
    }

    /// Exactly the add-row: no name and no value.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.value.is_empty()
    }

    /// Nothing but whitespace in either cell.
    pub fn is_blank(&self) -> bool {
        self.name.trim().is_empty() && self.value.trim().is_empty()
    }
}

/// Merge server variables with the locally stored snapshot.
///
/// Order: server variables in server order, then local-only variables in
/// snapshot order, then the single empty add-row.
pub fn merge(server: &EnvironmentSchema, local: &[ResolvedVariable]) -> Vec<ResolvedVariable> {
    let mut by_name: HashMap<&str, &ResolvedVariable> = HashMap::new();
    for lv in local {
        if lv.name.trim().is_empty() {
            continue;
        }
        by_name.entry(lv.name.as_str()).or_insert(lv);
    }

    let mut result = Vec::with_capacity(server.variables.len() + local.len() + 1);

    for sv in &server.variables {
        let local_override = by_name.remove(sv.name.as_str());
        let (value, editable) = if sv.source.is_static() {
            (sv.source.value.clone().unwrap_or_default(), false)
        } else {
            (
                local_override.map(|lv| lv.value.clone()).unwrap_or_default(),
                true,
            )
        };

        result.push(ResolvedVariable {
            name: sv.name.clone(),
            value,
            editable,
            local: false,
        });
    }

    for lv in local {
        if lv.name.trim().is_empty() || !by_name.contains_key(lv.name.as_str()) {
            continue;
        }
        // first occurrence wins
        by_name.remove(lv.name.as_str());
        result.push(ResolvedVariable {
            name: lv.name.clone(),
            value: lv.value.clone(),
            editable: true,
            local: true,
        });
    }

    if !result.iter().any(ResolvedVariable::is_empty) {
        result.push(ResolvedVariable::empty());
    }

    result
}

/// Replace every `{{name}}` with the variable's value.
///
/// Unknown names become the empty string.
pub fn interpolate(input: &str, vars: &[ResolvedVariable]) -> String {
    if !input.contains("{{") {
        return input.to_string();
    }

    PLACEHOLDER
        .replace_all(input, |caps: &Captures| {
            let name = caps[1].trim();
            vars.iter()
                .find(|v| v.name == name)
                .map(|v| v.value.clone())
                .unwrap_or_default()
        })
        .into_owned()
}

/// Apply a local edit at `index` and keep the add-row invariant.
///
/// Static server variables are read-only and renaming a server variable is
/// refused; both return `false`.
pub fn set_variable(
    vars: &mut Vec<ResolvedVariable>,
    index: usize,
    name: impl Into<String>,
    value: impl Into<String>,
) -> bool {
    let Some(var) = vars.get_mut(index) else {
        return false;
    };
    let name = name.into().trim().to_string();
    if !var.editable || (!var.local && var.name != name) {
        return false;
    }
    var.name = name;
    var.value = value.into();
    normalize_rows(vars);
    true
}

/// Remove a local variable. Server variables cannot be removed.
pub fn remove_variable(vars: &mut Vec<ResolvedVariable>, index: usize) -> bool {
    match vars.get(index) {
        Some(var) if var.local => {
            vars.remove(index);
            normalize_rows(vars);
            true
        }
        _ => false,
    }
}

/// Local entries worth persisting: every named variable except static ones.
pub fn local_snapshot(vars: &[ResolvedVariable]) -> Vec<ResolvedVariable> {
    vars.iter()
        .filter(|v| !v.name.trim().is_empty() && v.editable)
        .cloned()
        .collect()
}

fn normalize_rows(vars: &mut Vec<ResolvedVariable>) {
    vars.retain(|v| !(v.local && v.is_blank()));
    vars.push(ResolvedVariable::empty());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ServerVariable, VariableSource};

    fn server(vars: &[(&str, Option<&str>)]) -> EnvironmentSchema {
        EnvironmentSchema {
            variables: vars
                .iter()
                .map(|(name, value)| ServerVariable {
                    name: name.to_string(),
                    source: VariableSource {
                        kind: None,
                        value: value.map(String::from),
                    },
                })
                .collect(),
        }
    }

    fn local(name: &str, value: &str) -> ResolvedVariable {
        ResolvedVariable {
            name: name.to_string(),
            value: value.to_string(),
            editable: true,
            local: true,
        }
    }

    #[test]
    fn test_static_server_value_wins() {
        let merged = merge(&server(&[("host", Some("api.local"))]), &[local("host", "evil")]);
        assert_eq!(merged[0].value, "api.local");
        assert!(!merged[0].editable);
        assert!(!merged[0].local);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_dynamic_server_value_takes_local_override() {
        let merged = merge(&server(&[("token", None)]), &[local("token", "abc")]);
        assert_eq!(merged[0].value, "abc");
        assert!(merged[0].editable);
        assert!(!merged[0].local);
    }

    #[test]
    fn test_order_is_server_then_local_then_sentinel() {
        let merged = merge(
            &server(&[("b", None), ("a", Some("1"))]),
            &[local("z", "26"), local("b", "2"), local("y", "25")],
        );
        let names: Vec<_> = merged.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "z", "y", ""]);
        assert!(merged[2].local && merged[2].editable);
    }

    #[test]
    fn test_exactly_one_empty_row() {
        let inputs = vec![
            vec![],
            vec![ResolvedVariable::empty()],
            vec![ResolvedVariable::empty(), ResolvedVariable::empty(), local("x", "1")],
            vec![local(" ", ""), local("\t", " ")],
        ];
        for snapshot in inputs {
            let merged = merge(&server(&[("a", None)]), &snapshot);
            assert_eq!(merged.iter().filter(|v| v.is_empty()).count(), 1);
        }
    }

    #[test]
    fn test_interpolate() {
        let vars = vec![local("userId", "42"), local("host", "example.com")];
        assert_eq!(interpolate("https://{{host}}/u/{{ userId }}", &vars), "https://example.com/u/42");
        assert_eq!(interpolate("{{missing}}-x", &vars), "-x");
        assert_eq!(interpolate("{{unterminated", &vars), "{{unterminated");
        assert_eq!(interpolate("/users/{id}", &vars), "/users/{id}");
    }

    #[test]
    fn test_edit_keeps_single_add_row() {
        let mut vars = merge(&server(&[("a", Some("1"))]), &[]);
        assert!(!set_variable(&mut vars, 0, "a", "2"));

        let add_row = vars.len() - 1;
        assert!(set_variable(&mut vars, add_row, "token", "t"));
        assert_eq!(vars.iter().filter(|v| v.is_empty()).count(), 1);
        assert_eq!(vars.last(), Some(&ResolvedVariable::empty()));

        let add_row = vars.len() - 1;
        assert!(set_variable(&mut vars, add_row, "  ", ""));
        assert_eq!(vars.iter().filter(|v| v.is_empty()).count(), 1);
        assert!(set_variable(&mut vars, 1, " token ", "t2"));
        assert_eq!(vars[1].name, "token");

        assert!(remove_variable(&mut vars, 1));
        assert!(!remove_variable(&mut vars, 0));
        assert_eq!(vars.len(), 2);
        assert_eq!(local_snapshot(&vars).len(), 0);
    }
}
