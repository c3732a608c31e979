//! `VariableSet` — an ordered, layered key/value store with `$VAR`/`${VAR}`
//! expansion.

use std::sync::LazyLock;

use regex::Regex;
use runner_core::job::JobVariable;

/// Matches `$$`, `${NAME}` or `$NAME` in a single left-to-right pass so
/// that substituted content is never re-scanned for further variables.
static EXPAND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\$|\$\{([a-zA-Z_][a-zA-Z0-9_]*)\}|\$([a-zA-Z_][a-zA-Z0-9_]*)").unwrap()
});

/// An ordered, layered key/value store. Later `append` calls shadow
/// earlier ones with the same key for `get`, but nothing is ever removed:
/// `string_list` still emits every entry unless deduplication is
/// requested.
#[derive(Debug, Clone, Default)]
pub struct VariableSet {
    entries: Vec<JobVariable>,
}

impl VariableSet {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn append(&mut self, var: JobVariable) {
        self.entries.push(var);
    }

    /// Convenience for appending a plain, unmasked, non-file variable.
    pub fn append_value(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.append(JobVariable::new(key, value));
    }

    /// The value of the last `append` call for `key`, or `""` if the key
    /// was never appended.
    pub fn get(&self, key: &str) -> String {
        self.entries
            .iter()
            .rev()
            .find(|v| v.key == key)
            .map(|v| v.value.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|v| v.key == key)
    }

    /// `KEY=VALUE` pairs in insertion order, duplicates included.
    pub fn string_list(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|v| format!("{}={}", v.key, v.value))
            .collect()
    }

    /// `KEY=VALUE` pairs with only the last value per key retained, still
    /// ordered by each surviving key's last append position.
    pub fn string_list_deduped(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for var in self.entries.iter().rev() {
            if seen.insert(var.key.clone()) {
                out.push(format!("{}={}", var.key, var.value));
            }
        }
        out.reverse();
        out
    }

    /// Values of variables declared non-public, for a `Trace` to mask.
    pub fn masked_values(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|v| !v.public)
            .map(|v| v.value.as_str())
            .collect()
    }

    /// Keys of variables an executor should materialize as files rather
    /// than environment variables.
    pub fn file_variables(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|v| v.file)
            .map(|v| v.key.as_str())
            .collect()
    }

    /// Expands `$NAME`/`${NAME}` references against this set. `$$` is a
    /// literal `$`; unknown names expand to `""`; expansion is single pass
    /// (the regex scans `template` once, never the substituted output).
    pub fn expand(&self, template: &str) -> String {
        EXPAND_RE
            .replace_all(template, |caps: &regex::Captures| {
                if caps.get(0).unwrap().as_str() == "$$" {
                    return "$".to_string();
                }
                let name = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .expect("non-$$ match always captures a name")
                    .as_str();
                self.get(name)
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_last_write() {
        let mut vars = VariableSet::new();
        vars.append_value("FOO", "one");
        vars.append_value("FOO", "two");
        assert_eq!(vars.get("FOO"), "two");
    }

    #[test]
    fn get_missing_key_is_empty_string() {
        let vars = VariableSet::new();
        assert_eq!(vars.get("MISSING"), "");
    }

    #[test]
    fn string_list_preserves_insertion_order_with_duplicates() {
        let mut vars = VariableSet::new();
        vars.append_value("A", "1");
        vars.append_value("B", "2");
        vars.append_value("A", "3");
        assert_eq!(
            vars.string_list(),
            vec!["A=1".to_string(), "B=2".to_string(), "A=3".to_string()]
        );
    }

    #[test]
    fn string_list_deduped_keeps_last_value_per_key() {
        let mut vars = VariableSet::new();
        vars.append_value("A", "1");
        vars.append_value("B", "2");
        vars.append_value("A", "3");
        assert_eq!(
            vars.string_list_deduped(),
            vec!["B=2".to_string(), "A=3".to_string()]
        );
    }

    #[test]
    fn expand_dollar_brace_and_bare() {
        let mut vars = VariableSet::new();
        vars.append_value("NAME", "world");
        assert_eq!(vars.expand("hello ${NAME}"), "hello world");
        assert_eq!(vars.expand("hello $NAME"), "hello world");
    }

    #[test]
    fn expand_double_dollar_is_literal() {
        let vars = VariableSet::new();
        assert_eq!(vars.expand("cost: $$5"), "cost: $5");
    }

    #[test]
    fn expand_unknown_variable_is_empty() {
        let vars = VariableSet::new();
        assert_eq!(vars.expand("[${MISSING}]"), "[]");
    }

    #[test]
    fn expand_is_single_pass_not_recursive() {
        // If expansion were recursive, substituting INNER into OUTER's
        // value would then re-expand the literal text "${NAME}" it
        // contains. Single-pass expansion must leave it untouched.
        let mut vars = VariableSet::new();
        vars.append_value("OUTER", "${NAME}");
        vars.append_value("NAME", "world");
        assert_eq!(vars.expand("${OUTER}"), "${NAME}");
    }

    #[test]
    fn expand_is_idempotent_without_dollar_signs() {
        let vars = VariableSet::new();
        let input = "no variables here";
        assert_eq!(vars.expand(input), input);
    }

    #[test]
    fn masked_values_only_includes_non_public() {
        let mut vars = VariableSet::new();
        vars.append_value("PUBLIC_VAR", "visible");
        vars.append(JobVariable::new("SECRET", "shh").masked());
        assert_eq!(vars.masked_values(), vec!["shh"]);
    }

    #[test]
    fn file_variables_only_includes_file_flagged() {
        let mut vars = VariableSet::new();
        vars.append_value("ENV_VAR", "x");
        vars.append(JobVariable::new("KEYFILE", "contents").as_file());
        assert_eq!(vars.file_variables(), vec!["KEYFILE"]);
    }
}
