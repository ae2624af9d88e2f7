/// Emit SIEVE script text from AST nodes.
///
/// Output is canonical: four-space indentation, CRLF line endings, one
/// command per line, comments dropped. Two trees that differ only in
/// positions or comments emit the same text.
use crate::sieve::ast::*;

const INDENT: &str = "    ";

pub fn emit(tree: &Tree) -> String {
    let mut out = String::new();
    emit_commands(&mut out, &tree.start, 0);
    out
}

fn emit_commands(out: &mut String, list: &CommandList, indent: usize) {
    for cmd in &list.commands {
        emit_command(out, cmd, indent);
    }
}

fn emit_command(out: &mut String, cmd: &Command, indent: usize) {
    out.push_str(&INDENT.repeat(indent));
    match cmd {
        Command::Require(req) => {
            out.push_str("require ");
            if req.capabilities.len() == 1 {
                emit_quoted(out, &req.capabilities[0]);
            } else {
                out.push('[');
                for (i, cap) in req.capabilities.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    emit_quoted(out, cap);
                }
                out.push(']');
            }
            out.push_str(";\r\n");
        }
        Command::Stop(_) | Command::Keep(_) | Command::Discard(_) => {
            out.push_str(cmd.keyword());
            out.push_str(";\r\n");
        }
        Command::Redirect(r) => {
            out.push_str("redirect ");
            emit_quoted(out, &r.address.value);
            out.push_str(";\r\n");
        }
        Command::If(node) => emit_if(out, node, indent),
    }
}

fn emit_if(out: &mut String, node: &If, indent: usize) {
    out.push_str("if ");
    emit_test(out, &node.test);
    emit_block(out, &node.body, indent);

    for branch in &node.else_ifs {
        out.push_str(" elsif ");
        emit_test(out, &branch.test);
        emit_block(out, &branch.body, indent);
    }

    if let Some(otherwise) = &node.otherwise {
        out.push_str(" else");
        emit_block(out, &otherwise.body, indent);
    }

    out.push_str("\r\n");
}

fn emit_block(out: &mut String, body: &CommandList, indent: usize) {
    out.push_str(" {\r\n");
    emit_commands(out, body, indent + 1);
    out.push_str(&INDENT.repeat(indent));
    out.push('}');
}

fn emit_test(out: &mut String, test: &Test) {
    out.push_str(&test.name);
    for arg in &test.arguments {
        out.push(' ');
        emit_argument(out, arg);
    }

    if test.test_list {
        out.push_str(" (");
        for (i, inner) in test.tests.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            emit_test(out, inner);
        }
        out.push(')');
    } else {
        for inner in &test.tests {
            out.push(' ');
            emit_test(out, inner);
        }
    }
}

fn emit_argument(out: &mut String, arg: &Argument) {
    match arg {
        Argument::StringList(list) => emit_string_list(out, list),
        Argument::Number(n) => {
            out.push_str(&n.value.to_string());
            if let Some(q) = n.quantifier {
                out.push(q.as_sieve());
            }
        }
        Argument::Tag(tag) => {
            out.push(':');
            out.push_str(&tag.name);
        }
    }
}

fn emit_string_list(out: &mut String, list: &StringList) {
    if !list.bracketed && list.items.len() == 1 {
        emit_quoted(out, &list.items[0].value);
        return;
    }
    out.push('[');
    for (i, item) in list.items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        emit_quoted(out, &item.value);
    }
    out.push(']');
}

fn emit_quoted(out: &mut String, value: &str) {
    out.push('"');
    out.push_str(&escape_sieve_string(value));
    out.push('"');
}

fn escape_sieve_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
