//! Canonical kernel text: four-space indentation, one statement per line.
//! Snapshot tests compare against this output, so it must stay stable.

use super::*;

const INDENT: &str = "    ";

pub fn format(stmt: &Stmt) -> String {
    let mut out = String::new();
    fmt_stmt(&mut out, stmt, 0);
    while out.ends_with('\n') {
        out.pop();
    }
    out
}

fn indent(out: &mut String, level: usize) {
    for _ in 0..level {
        out.push_str(INDENT);
    }
}

fn line(out: &mut String, level: usize, text: &str) {
    indent(out, level);
    out.push_str(text);
    out.push('\n');
}

fn fmt_stmt(out: &mut String, stmt: &Stmt, level: usize) {
    match stmt {
        Stmt::Local { idents, body } => {
            line(out, level, &format!("local {} in", join(idents.iter().map(|i| i.to_string()))));
            fmt_stmt(out, body, level + 1);
            line(out, level, "end");
        }
        Stmt::Seq(stmts) => {
            for stmt in stmts {
                fmt_stmt(out, stmt, level);
            }
        }
        Stmt::Skip => line(out, level, "skip"),
        Stmt::Bind { arg, target } => {
            line(out, level, &format!("$bind({}, {})", fmt_arg(arg), target));
        }
        Stmt::BinOp { op, left, right, target } => {
            line(out, level, &format!("{}({}, {}, {})", op.name(), fmt_arg(left), fmt_arg(right), target));
        }
        Stmt::Negate { arg, target } => {
            line(out, level, &format!("$negate({}, {})", fmt_arg(arg), target));
        }
        Stmt::Get { cell, target } => {
            line(out, level, &format!("$get({}, {})", fmt_arg(cell), target));
        }
        Stmt::Set { cell, value } => {
            line(out, level, &format!("$set({}, {})", fmt_arg(cell), fmt_arg(value)));
        }
        Stmt::Select { rec, feature, target } => {
            line(out, level, &format!("$select({}, {}, {})", fmt_arg(rec), fmt_arg(feature), target));
        }
        Stmt::SelectApply { rec, path, args } => {
            let mut parts = vec![fmt_arg(rec), format!("[{}]", fmt_args(path))];
            parts.extend(args.iter().map(fmt_arg));
            line(out, level, &format!("$select_apply({})", join(parts)));
        }
        Stmt::CreateRec { label, fields, target } => {
            let fields = join(fields.iter().map(|(f, v)| format!("{}: {}", fmt_arg(f), fmt_arg(v))));
            line(out, level, &format!("$create_rec({}{{{}}}, {})", fmt_label(label), fields, target));
        }
        Stmt::CreateTuple { label, values, target } => {
            line(out, level, &format!("$create_tuple({}[{}], {})", fmt_label(label), fmt_args(values), target));
        }
        Stmt::CreateProc { def, target } => fmt_proc(out, "$create_proc", def, target, level),
        Stmt::CreateActorCfgtr { def, target } => fmt_proc(out, "$create_actor_cfgtr", def, target, level),
        Stmt::Apply { proc, args } => {
            line(out, level, &format!("{}({})", fmt_arg(proc), fmt_args(args)));
        }
        Stmt::If { cond, then, otherwise } => {
            line(out, level, &format!("if {} then", fmt_arg(cond)));
            fmt_branches(out, then, otherwise, level);
        }
        Stmt::Case { arg, pat, then, otherwise } => {
            line(out, level, &format!("case {} of {} then", fmt_arg(arg), fmt_pat(pat)));
            fmt_branches(out, then, otherwise, level);
        }
        Stmt::Try { body, catch, handler } => {
            line(out, level, "try");
            fmt_stmt(out, body, level + 1);
            line(out, level, &format!("catch {} then", catch));
            fmt_stmt(out, handler, level + 1);
            line(out, level, "end");
        }
        Stmt::Throw(arg) => line(out, level, &format!("throw {}", fmt_arg(arg))),
        Stmt::JumpThrow(label) => line(out, level, &format!("$jump_throw({})", label)),
        Stmt::JumpCatch(label) => line(out, level, &format!("$jump_catch({})", label)),
    }
}

fn fmt_branches(out: &mut String, then: &Stmt, otherwise: &Stmt, level: usize) {
    fmt_stmt(out, then, level + 1);
    if *otherwise != Stmt::Skip {
        line(out, level, "else");
        fmt_stmt(out, otherwise, level + 1);
    }
    line(out, level, "end");
}

fn fmt_proc(out: &mut String, prim: &str, def: &ProcDef, target: &Ident, level: usize) {
    let params = join(def.params.iter().map(|p| p.to_string()));
    line(out, level, &format!("{}(proc ({}) in", prim, params));
    fmt_stmt(out, &def.body, level + 1);
    line(out, level, &format!("end, {})", target));
}

fn join(parts: impl IntoIterator<Item = String>) -> String {
    parts.into_iter().collect::<Vec<_>>().join(", ")
}

fn fmt_args(args: &[Arg]) -> String {
    join(args.iter().map(fmt_arg))
}

fn fmt_label(label: &Option<Arg>) -> String {
    match label {
        Some(label) => format!("{}#", fmt_arg(label)),
        None => String::new(),
    }
}

pub fn fmt_arg(arg: &Arg) -> String {
    match arg {
        Arg::Ident(ident) => ident.to_string(),
        Arg::Lit(lit) => fmt_lit(lit),
    }
}

pub fn fmt_lit(lit: &Lit) -> String {
    match lit {
        Lit::Bool(b) => b.to_string(),
        Lit::Int32(n) => n.to_string(),
        Lit::Int64(n) => format!("{}L", n),
        Lit::Flt32(f) => format!("{:?}f", f),
        Lit::Flt64(f) => format!("{:?}", f),
        Lit::Dec128(d) => format!("{}m", d),
        Lit::Char(c) => format!("&{}", escape_char(*c)),
        Lit::Str(s) => quote_str(s),
        Lit::Null => "null".to_string(),
        Lit::Eof => "eof".to_string(),
    }
}

fn escape_char(c: char) -> String {
    match c {
        '\n' => "\\n".to_string(),
        '\r' => "\\r".to_string(),
        '\t' => "\\t".to_string(),
        '\0' => "\\0".to_string(),
        '\\' => "\\\\".to_string(),
        other => other.to_string(),
    }
}

/// Single-quoted string with `\` and `'` escaped.
pub fn quote_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

fn fmt_feat_pat(pat: &FeatPat) -> String {
    match pat {
        FeatPat::Lit(lit) => fmt_lit(lit),
        FeatPat::Escaped(ident) => format!("~{}", ident),
    }
}

fn fmt_leaf_pat(pat: &LeafPat) -> String {
    match pat {
        LeafPat::Lit(lit) => fmt_lit(lit),
        LeafPat::Ident(ident) => ident.to_string(),
        LeafPat::Escaped(ident) => format!("~{}", ident),
    }
}

pub fn fmt_pat(pat: &Pat) -> String {
    match pat {
        Pat::Lit(lit) => fmt_lit(lit),
        Pat::Ident(ident) => ident.to_string(),
        Pat::Escaped(ident) => format!("~{}", ident),
        Pat::Rec(rec) => fmt_rec_pat(rec),
    }
}

/// Record patterns whose features are exactly `0..n` print as tuples.
fn fmt_rec_pat(rec: &RecPat) -> String {
    let mut out = String::new();
    if let Some(label) = &rec.label {
        out.push_str(&fmt_feat_pat(label));
        out.push('#');
    }
    let is_tuple = rec
        .fields
        .iter()
        .enumerate()
        .all(|(i, (f, _))| *f == FeatPat::Lit(Lit::Int32(i as i32)));
    let mut parts: Vec<String> = if is_tuple && !rec.fields.is_empty() {
        rec.fields.iter().map(|(_, v)| fmt_leaf_pat(v)).collect()
    } else {
        rec.fields
            .iter()
            .map(|(f, v)| format!("{}: {}", fmt_feat_pat(f), fmt_leaf_pat(v)))
            .collect()
    };
    if rec.partial {
        parts.push("...".to_string());
    }
    let (open, close) = if is_tuple && !rec.fields.is_empty() { ('[', ']') } else { ('{', '}') };
    out.push(open);
    out.push_str(&parts.join(", "));
    out.push(close);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn id(name: &str) -> Ident {
        Ident::new(name)
    }

    #[test]
    fn literals_print_canonically() {
        assert_eq!(fmt_lit(&Lit::Int32(5)), "5");
        assert_eq!(fmt_lit(&Lit::Int64(5)), "5L");
        assert_eq!(fmt_lit(&Lit::Flt64(1.5)), "1.5");
        assert_eq!(fmt_lit(&Lit::Flt64(2.0)), "2.0");
        assert_eq!(fmt_lit(&Lit::Flt32(1.5)), "1.5f");
        assert_eq!(fmt_lit(&Lit::Dec128(Decimal::new(15, 1))), "1.5m");
        assert_eq!(fmt_lit(&Lit::Char('c')), "&c");
        assert_eq!(fmt_lit(&Lit::Char('\n')), "&\\n");
        assert_eq!(fmt_lit(&Lit::str("it's")), "'it\\'s'");
        assert_eq!(fmt_lit(&Lit::Bool(true)), "true");
        assert_eq!(fmt_lit(&Lit::Null), "null");
        assert_eq!(fmt_lit(&Lit::Eof), "eof");
    }

    #[test]
    fn local_and_primitives() {
        let stmt = Stmt::local(
            vec![id("$v0")],
            Stmt::seq(vec![
                Stmt::BinOp { op: BinPrim::Mult, left: Lit::Int32(3).into(), right: Lit::Int32(5).into(), target: id("$v0") },
                Stmt::BinOp { op: BinPrim::Add, left: Lit::Int32(2).into(), right: id("$v0").into(), target: id("x") },
            ]),
        );
        assert_eq!(format(&stmt), "local $v0 in\n    $mult(3, 5, $v0)\n    $add(2, $v0, x)\nend");
    }

    #[test]
    fn records_tuples_and_select_apply() {
        let stmt = Stmt::seq(vec![
            Stmt::CreateRec {
                label: Some(Lit::str("l").into()),
                fields: vec![(Lit::str("a").into(), id("x").into())],
                target: id("t"),
            },
            Stmt::CreateTuple { label: None, values: vec![id("a").into(), id("b").into()], target: id("u") },
            Stmt::SelectApply { rec: id("r").into(), path: vec![Lit::str("f").into()], args: vec![id("a").into(), id("t").into()] },
            Stmt::Select { rec: id("r").into(), feature: Lit::str("f").into(), target: id("t") },
        ]);
        assert_eq!(
            format(&stmt),
            "$create_rec('l'#{'a': x}, t)\n\
             $create_tuple([a, b], u)\n\
             $select_apply(r, ['f'], a, t)\n\
             $select(r, 'f', t)"
        );
    }

    #[test]
    fn proc_and_if_without_else() {
        let body = Stmt::if_else(id("c"), Stmt::bind(Lit::Int32(1), id("$r")), Stmt::Skip);
        let stmt = Stmt::create_proc(vec![id("n"), id("$r")], body, id("fact"));
        assert_eq!(
            format(&stmt),
            "$create_proc(proc (n, $r) in\n    if c then\n        $bind(1, $r)\n    end\nend, fact)"
        );
    }

    #[test]
    fn case_and_try() {
        let pat = Pat::Rec(RecPat {
            label: Some(FeatPat::Lit(Lit::str("l"))),
            fields: vec![(FeatPat::Lit(Lit::Int32(0)), LeafPat::Ident(id("x")))],
            partial: true,
        });
        let stmt = Stmt::Try {
            body: Arc::new(Stmt::Case {
                arg: id("a").into(),
                pat,
                then: Arc::new(Stmt::JumpThrow(3)),
                otherwise: Arc::new(Stmt::apply(id("$v1"), vec![id("t").into()])),
            }),
            catch: id("$v2"),
            handler: Arc::new(Stmt::Throw(id("$v2").into())),
        };
        assert_eq!(
            format(&stmt),
            "try\n    case a of 'l'#[x, ...] then\n        $jump_throw(3)\n    else\n        $v1(t)\n    end\ncatch $v2 then\n    throw $v2\nend"
        );
    }

    #[test]
    fn record_pattern_with_string_features() {
        let pat = Pat::Rec(RecPat {
            label: None,
            fields: vec![
                (FeatPat::Lit(Lit::str("0")), LeafPat::Ident(id("$v0"))),
                (FeatPat::Escaped(id("k")), LeafPat::Escaped(id("v"))),
            ],
            partial: false,
        });
        assert_eq!(fmt_pat(&pat), "{'0': $v0, ~k: ~v}");
        let empty = Pat::Rec(RecPat { label: None, fields: vec![], partial: true });
        assert_eq!(fmt_pat(&empty), "{...}");
    }
}
