//! Expression translation
//!
//! Rewrites a bare expression string so that bare identifiers refer to
//! instance state (`title` becomes `instance.title`), leaving string
//! literals, member accesses, object keys, reserved words and
//! `$`-prefixed locals alone. Reports whether the result is dynamic,
//! i.e. reads instance state and must be re-evaluated on update.

use regex::{Captures, Regex};

/// One scan, alternatives in priority order: quoted strings, numeric
/// literals with an identifier suffix, `.member` fragments, `ident:`
/// object keys, and finally (captured) bare identifiers.
const EXPRESSION_PATTERN: &str =
    r#""[^"]*"|'[^']*'|\d+[a-zA-Z$_]\w*|\.[a-zA-Z$_]\w*|[a-zA-Z$_]\w*:|([a-zA-Z$_]\w*)"#;

/// Names that never refer to instance state.
const RESERVED: &[&str] = &["event", "false", "in", "null", "true"];

/// How `$`-prefixed local identifiers are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalsStyle {
    /// Compiled output: `$item` becomes `locals.$item`.
    Qualified,
    /// Runtime directives resolve locals through an injected scope
    /// object, so `$item` passes through untouched.
    Bare,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translated {
    pub expression: String,
    pub dynamic: bool,
}

/// Translate with the compiled-output locals style.
pub fn translate(expression: &str) -> Translated {
    translate_with(expression, LocalsStyle::Qualified)
}

pub fn translate_with(expression: &str, locals: LocalsStyle) -> Translated {
    let re = Regex::new(EXPRESSION_PATTERN).unwrap();
    let mut dynamic = false;

    let rewritten = re.replace_all(expression, |caps: &Captures| {
        let name = match caps.get(1) {
            // Matched a non-identifier alternative; pass through.
            None => return caps[0].to_string(),
            Some(name) => name.as_str(),
        };

        if RESERVED.contains(&name) {
            name.to_string()
        } else if name.starts_with('$') {
            match locals {
                LocalsStyle::Qualified => format!("locals.{name}"),
                LocalsStyle::Bare => name.to_string(),
            }
        } else {
            dynamic = true;
            format!("instance.{name}")
        }
    });

    Translated {
        expression: rewritten.into_owned(),
        dynamic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_identifier_is_instance_state() {
        let t = translate("title");
        assert_eq!(t.expression, "instance.title");
        assert!(t.dynamic);
    }

    #[test]
    fn string_literals_untouched() {
        let t = translate("\"title\"");
        assert_eq!(t.expression, "\"title\"");
        assert!(!t.dynamic);

        let t = translate("'a b c'");
        assert_eq!(t.expression, "'a b c'");
        assert!(!t.dynamic);
    }

    #[test]
    fn member_access_keeps_root_only() {
        let t = translate("user.name");
        assert_eq!(t.expression, "instance.user.name");
        assert!(t.dynamic);
    }

    #[test]
    fn object_keys_untouched() {
        let t = translate("{label: title}");
        assert_eq!(t.expression, "{label: instance.title}");
        assert!(t.dynamic);
    }

    #[test]
    fn numeric_suffix_untouched() {
        // `2px` must not become `2instance.px`.
        let t = translate("2px");
        assert_eq!(t.expression, "2px");
        assert!(!t.dynamic);
    }

    #[test]
    fn reserved_words_untouched() {
        for word in ["true", "false", "null", "in", "event"] {
            let t = translate(word);
            assert_eq!(t.expression, word);
            assert!(!t.dynamic, "{word} must not be dynamic");
        }
    }

    #[test]
    fn locals_qualified_in_compiled_output() {
        let t = translate("$item in items");
        assert_eq!(t.expression, "locals.$item in instance.items");
        assert!(t.dynamic);
    }

    #[test]
    fn locals_bare_for_runtime() {
        let t = translate_with("$item", LocalsStyle::Bare);
        assert_eq!(t.expression, "$item");
        assert!(!t.dynamic);
    }

    #[test]
    fn mixed_expression() {
        let t = translate("greet(name, \"literal\", $local)");
        assert_eq!(
            t.expression,
            "instance.greet(instance.name, \"literal\", locals.$local)"
        );
        assert!(t.dynamic);
    }
}
