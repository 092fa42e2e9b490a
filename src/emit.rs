//! Source rendering of render programs
//!
//! Serializes a [`Program`] to the compiled-output contract: one
//! self-contained declaration of the slot handles followed by the
//! procedure triple, calling the `m.*` runtime shim
//! (`ce`/`ctn`/`cc`/`sa`/`ael`/`stc`/`ac`/`rc`/`ib`/`di`/`df`). Output
//! is a deterministic function of the program, so compiling the same
//! markup twice yields identical text.

use crate::ir::{Branch, ForLoop, Op, Program, TemplateValue};

/// Render a program to source text.
pub fn emit(program: &Program) -> String {
    let mut out = String::new();

    out.push_str(&format!("var m{}", program.root));
    for slot in program.root + 1..program.next {
        out.push_str(&format!(",m{slot}"));
    }
    out.push_str(";return [function($_){");
    out.push_str(&format!("m{}=$_;", program.root));
    emit_ops(&mut out, &program.create);
    out.push_str("},function(){");
    emit_ops(&mut out, &program.update);
    out.push_str("},function(){");
    emit_ops(&mut out, &program.destroy);
    out.push_str("}];");

    out
}

fn emit_ops(out: &mut String, ops: &[Op]) {
    for op in ops {
        emit_op(out, op);
    }
}

fn emit_op(out: &mut String, op: &Op) {
    match op {
        Op::CreateElement { slot, tag } => {
            out.push_str(&format!("m{slot}=m.ce(\"{tag}\");"));
        }
        Op::CreateText { slot } => {
            out.push_str(&format!("m{slot}=m.ctn(\"\");"));
        }
        Op::CreateComment { slot } => {
            out.push_str(&format!("m{slot}=m.cc();"));
        }
        Op::SetAttribute { slot, key, value } => {
            out.push_str(&format!("m.sa(m{slot},\"{key}\",{});", value_code(value)));
        }
        Op::SetText { slot, value } => {
            out.push_str(&format!("m.stc(m{slot},{});", value_code(value)));
        }
        Op::BindEvent {
            slot,
            handler,
            event,
        } => {
            out.push_str(&format!(
                "m.ael(m{slot},\"{event}\",function($event){{m{handler}($event);}});"
            ));
        }
        Op::SetHandler {
            handler,
            expression,
        } => {
            out.push_str(&format!(
                "m{handler}=function($event){{locals.$event=$event;{};}};",
                value_code(expression)
            ));
        }
        Op::Append { slot, parent } => {
            out.push_str(&format!("m.ac(m{slot},m{parent});"));
        }
        Op::InsertBefore {
            slot,
            reference,
            parent,
        } => {
            out.push_str(&format!("m.ib(m{slot},m{reference},m{parent});"));
        }
        Op::Remove { slot, parent } => {
            out.push_str(&format!("m.rc(m{slot},m{parent});"));
        }
        Op::IfInit(chain) => {
            out.push_str(&format!("m{}=[", chain.portions));
            emit_list(out, &chain.branches, |out, branch: &Branch| {
                out.push_str("function(locals){");
                out.push_str(&emit(&branch.body));
                out.push_str("}(locals)");
            });
            out.push_str("];");
        }
        Op::IfApply(chain) => {
            out.push_str(&format!("m{}=[", chain.conditions));
            emit_list(out, &chain.branches, |out, branch: &Branch| {
                out.push_str(&value_code(&branch.condition));
            });
            out.push_str("];");
            out.push_str(&format!(
                "m{state}=m.di(m{state},m{anchor},m{conditions},m{portions},m{parent});",
                state = chain.state,
                anchor = chain.anchor,
                conditions = chain.conditions,
                portions = chain.portions,
                parent = chain.parent,
            ));
        }
        Op::IfDestroy(chain) => {
            out.push_str(&format!("m{state}&&m{state}[2]();", state = chain.state));
        }
        Op::ForInit(for_loop) => {
            out.push_str(&format!("m{}=function(locals){{", for_loop.factory));
            out.push_str(&emit(&for_loop.body));
            out.push_str("};");
            out.push_str(&format!("m{}=[];", for_loop.items));
            out.push_str(&format!("m{}=[];", for_loop.locals));
        }
        Op::ForApply(for_loop) => {
            emit_for_call(out, for_loop, &value_code(&for_loop.source));
        }
        Op::ForDestroy(for_loop) => {
            emit_for_call(out, for_loop, "[]");
        }
    }
}

fn emit_for_call(out: &mut String, for_loop: &ForLoop, source: &str) {
    out.push_str(&format!("m.df([\"{}\"", for_loop.value_identifier));
    if let Some(key) = &for_loop.key_identifier {
        out.push_str(&format!(",\"{key}\""));
    }
    out.push_str(&format!(
        "],{source},m{anchor},m{factory},m{items},m{locals},m{parent});",
        anchor = for_loop.anchor,
        factory = for_loop.factory,
        items = for_loop.items,
        locals = for_loop.locals,
        parent = for_loop.parent,
    ));
}

fn emit_list<T>(out: &mut String, items: &[T], mut each: impl FnMut(&mut String, &T)) {
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        each(out, item);
    }
}

/// Expression values render verbatim; literals render as quoted strings
/// with backslash, double-quote and newline escaped for embedding.
fn value_code(value: &TemplateValue) -> String {
    if value.expression {
        value.source.clone()
    } else {
        format!("\"{}\"", escape(&value.source))
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{codegen, parser};

    fn compile(markup: &str) -> String {
        emit(&codegen::generate(&parser::parse_silent(markup).root))
    }

    #[test]
    fn heading_with_dynamic_text() {
        assert_eq!(
            compile("<h1>{title}</h1>"),
            "var m0,m1,m2;\
             return [function($_){m0=$_;m1=m.ce(\"h1\");m2=m.ctn(\"\");m.ac(m2,m1);m.ac(m1,m0);},\
             function(){m.stc(m2,instance.title);},\
             function(){m.rc(m1,m0);}];"
        );
    }

    #[test]
    fn static_text_never_appears_in_update() {
        let source = compile("<p>hello</p>");
        let update = fragment(&source, 1);
        assert!(!update.contains("hello"));
        let create = fragment(&source, 0);
        assert!(create.contains("m.stc(m2,\"hello\");"));
    }

    #[test]
    fn dynamic_attribute_only_in_update() {
        let source = compile(r#"<a href="x" title={t}>y</a>"#);
        let create = fragment(&source, 0);
        let update = fragment(&source, 1);
        assert!(create.contains("m.sa(m1,\"href\",\"x\");"));
        assert!(!update.contains("href"));
        assert!(update.contains("m.sa(m1,\"title\",instance.t);"));
        assert!(!create.contains("instance.t"));
    }

    #[test]
    fn literal_escaping() {
        assert_eq!(value_code(&TemplateValue::literal("a\"b\\c\nd")), "\"a\\\"b\\\\c\\nd\"");
    }

    #[test]
    fn if_chain_rendering() {
        let source = compile("<div #if={a}>x</div><div #else>y</div>");
        assert!(source.contains("m4=[function(locals){"));
        assert!(source.contains("}(locals),function(locals){"));
        assert!(source.contains("m3=[instance.a,true];"));
        assert!(source.contains("m1=m.di(m1,m2,m3,m4,m0);"));
        assert!(source.contains("m1&&m1[2]();"));
    }

    #[test]
    fn for_loop_rendering() {
        let source = compile("<li #for={$item in items}>{$item}</li>");
        assert!(source.contains("m2=function(locals){var m5,m6,m7;"));
        assert!(source.contains("m3=[];m4=[];"));
        assert!(source.contains("m.df([\"$item\"],instance.items,m1,m2,m3,m4,m0);"));
        // Destroy runs the directive with an empty source.
        assert!(source.contains("m.df([\"$item\"],[],m1,m2,m3,m4,m0);"));
    }

    #[test]
    fn for_loop_key_identifier_rendered() {
        let source = compile("<li #for={$item,$i in items}>{$item}</li>");
        assert!(source.contains("m.df([\"$item\",\"$i\"]"));
    }

    #[test]
    fn emission_is_idempotent() {
        let markup = "<ul><li #for={$item in items}>{$item}</li></ul>";
        assert_eq!(compile(markup), compile(markup));
    }

    /// Extract the nth `function(...)` fragment of the top-level triple.
    fn fragment(source: &str, index: usize) -> String {
        let body = source.split("return [").nth(1).unwrap();
        let mut fragments = Vec::new();
        let mut depth = 0usize;
        let mut current = String::new();
        for c in body.chars() {
            match c {
                '{' => {
                    depth += 1;
                    current.push(c);
                }
                '}' => {
                    depth -= 1;
                    current.push(c);
                    if depth == 0 {
                        fragments.push(std::mem::take(&mut current));
                    }
                }
                _ => {
                    if depth > 0 {
                        current.push(c);
                    }
                }
            }
        }
        fragments[index].clone()
    }
}
