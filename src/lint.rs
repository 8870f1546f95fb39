//! Forbidden-token linting for the script and style pipelines.
//!
//! Each configured token is matched as a substring per line, and the first
//! hit fails the owning pipeline run before anything is written. The rule
//! lists live in the manifest (`lint.forbidScripts`, `lint.forbidStyles`).

use camino::Utf8Path;

use crate::error::LintError;

/// Check one source file against the forbidden-token rules. Fail-closed:
/// the first violation aborts with file, line and token.
pub fn check(path: &Utf8Path, source: &str, forbid: &[String]) -> Result<(), LintError> {
    for (index, line) in source.lines().enumerate() {
        for token in forbid {
            if !token.is_empty() && line.contains(token.as_str()) {
                return Err(LintError {
                    path: path.to_owned(),
                    line: index + 1,
                    token: token.clone(),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forbid(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn clean_source_passes() {
        let src = "function add(a, b) {\n    return a + b;\n}\n";
        assert!(check(Utf8Path::new("src/a.js"), src, &forbid(&["debugger"])).is_ok());
    }

    #[test]
    fn violation_names_file_line_and_token() {
        let src = "var x = 1;\ndebugger;\n";
        let err = check(Utf8Path::new("src/a.js"), src, &forbid(&["debugger"])).unwrap_err();

        assert_eq!(err.path, "src/a.js");
        assert_eq!(err.line, 2);
        assert_eq!(err.token, "debugger");

        let message = err.to_string();
        assert!(message.contains("src/a.js"));
        assert!(message.contains("debugger"));
    }

    #[test]
    fn style_rules_catch_important() {
        let src = ".nav {\n    color: red !important;\n}\n";
        let err = check(Utf8Path::new("styles/nav.scss"), src, &forbid(&["!important"])).unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn empty_rule_list_allows_everything() {
        assert!(check(Utf8Path::new("a.js"), "debugger;", &[]).is_ok());
    }
}
