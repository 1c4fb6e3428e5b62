//! Pattern compiler: surface patterns become a depth-one kernel pattern plus
//! an ordered list of deferred child matches, one per nested record.

use crate::ast::{self, Spanned};
use crate::kernel::{FeatPat, Ident, LeafPat, Lit, Pat, RecPat};

use super::{lower_literal, GenError, Names};

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPat {
    pub root: Pat,
    /// Pre-order: a child always precedes the children of its own fields.
    pub children: Vec<ChildPat>,
}

/// Match `pat` against the value captured in `arg` by an earlier pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildPat {
    pub arg: Ident,
    pub pat: RecPat,
}

pub fn compile(pat: &Spanned<ast::Pat>, names: &mut Names) -> Result<CompiledPat, GenError> {
    let mut children = Vec::new();
    let root = match &pat.node {
        ast::Pat::Lit(lit) => Pat::Lit(lower_literal(lit)),
        ast::Pat::Ident(name) => Pat::Ident(Ident::new(name)),
        ast::Pat::Escaped(name) => Pat::Escaped(Ident::new(name)),
        ast::Pat::Wildcard => Pat::Ident(names.anon()),
        ast::Pat::Rec { label, fields, partial } => {
            let entries = rec_entries(fields)?;
            Pat::Rec(compile_rec(label.as_deref(), entries, *partial, names, &mut children)?)
        }
        ast::Pat::Tuple { label, values, partial } => {
            let entries = tuple_entries(values);
            Pat::Rec(compile_rec(label.as_deref(), entries, *partial, names, &mut children)?)
        }
    };
    Ok(CompiledPat { root, children })
}

type Entries<'a> = Vec<(FeatPat, &'a Spanned<ast::Pat>)>;

fn rec_entries(fields: &[(Spanned<ast::Pat>, Spanned<ast::Pat>)]) -> Result<Entries<'_>, GenError> {
    fields.iter().map(|(feature, value)| Ok((feature_pat(feature)?, value))).collect()
}

/// Tuples are records over the features `0..n`.
fn tuple_entries(values: &[Spanned<ast::Pat>]) -> Entries<'_> {
    values
        .iter()
        .enumerate()
        .map(|(i, value)| (FeatPat::Lit(Lit::Int32(i as i32)), value))
        .collect()
}

fn compile_rec(
    label: Option<&Spanned<ast::Pat>>,
    entries: Entries<'_>,
    partial: bool,
    names: &mut Names,
    children: &mut Vec<ChildPat>,
) -> Result<RecPat, GenError> {
    let label = match label {
        Some(label) => Some(label_pat(label)?),
        None => None,
    };

    let mut fields = Vec::with_capacity(entries.len());
    for (feature, value) in entries {
        let leaf = match &value.node {
            ast::Pat::Lit(lit) => LeafPat::Lit(lower_literal(lit)),
            ast::Pat::Ident(name) => LeafPat::Ident(Ident::new(name)),
            ast::Pat::Escaped(name) => LeafPat::Escaped(Ident::new(name)),
            ast::Pat::Wildcard => LeafPat::Ident(names.anon()),
            ast::Pat::Rec { label, fields, partial } => {
                let entries = rec_entries(fields)?;
                hoist(label.as_deref(), entries, *partial, names, children)?
            }
            ast::Pat::Tuple { label, values, partial } => {
                let entries = tuple_entries(values);
                hoist(label.as_deref(), entries, *partial, names, children)?
            }
        };
        fields.push((feature, leaf));
    }

    Ok(RecPat { label, fields, partial })
}

/// Replaces a nested record with a fresh capture and defers its match.
fn hoist(
    label: Option<&Spanned<ast::Pat>>,
    entries: Entries<'_>,
    partial: bool,
    names: &mut Names,
    children: &mut Vec<ChildPat>,
) -> Result<LeafPat, GenError> {
    let arg = names.fresh();
    let mut nested = Vec::new();
    let pat = compile_rec(label, entries, partial, names, &mut nested)?;
    children.push(ChildPat { arg: arg.clone(), pat });
    children.extend(nested);
    Ok(LeafPat::Ident(arg))
}

fn feature_pat(pat: &Spanned<ast::Pat>) -> Result<FeatPat, GenError> {
    exact_pat(pat).ok_or(GenError::InvalidPatternFeature { span: pat.span })
}

fn label_pat(pat: &Spanned<ast::Pat>) -> Result<FeatPat, GenError> {
    exact_pat(pat).ok_or(GenError::InvalidPatternLabel { span: pat.span })
}

fn exact_pat(pat: &Spanned<ast::Pat>) -> Option<FeatPat> {
    match &pat.node {
        ast::Pat::Lit(lit) => {
            let lit = lower_literal(lit);
            lit.is_feature().then_some(FeatPat::Lit(lit))
        }
        ast::Pat::Escaped(name) => Some(FeatPat::Escaped(Ident::new(name))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;
    use crate::kernel::fmt::fmt_pat;
    use crate::{lexer, parser};

    /// Parses `case x of <pat> then skip end` and returns the pattern.
    fn pat_of(source: &str) -> Spanned<ast::Pat> {
        let code = format!("case x of {source} then skip end");
        let prog = parser::parse(lexer::lex(&code).unwrap()).unwrap();
        match prog.body.into_iter().next().unwrap().node {
            ast::SntcOrExpr::Case { mut clauses, .. } => clauses.remove(0).pat,
            other => panic!("unexpected {other:?}"),
        }
    }

    fn compile_str(source: &str) -> CompiledPat {
        compile(&pat_of(source), &mut Names::default()).unwrap()
    }

    #[test]
    fn nested_record_is_hoisted_into_child() {
        let compiled = compile_str("{'0': {'1': y}}");
        assert_eq!(fmt_pat(&compiled.root), "{'0': $v0}");
        assert_eq!(compiled.children.len(), 1);
        assert_eq!(compiled.children[0].arg, Ident::new("$v0"));
        assert_eq!(fmt_pat(&Pat::Rec(compiled.children[0].pat.clone())), "{'1': y}");
    }

    #[test]
    fn children_are_pre_order() {
        let compiled = compile_str("[[[a]], [b]]");
        let args: Vec<_> = compiled.children.iter().map(|c| c.arg.to_string()).collect();
        assert_eq!(args, vec!["$v0", "$v1", "$v2"]);
        assert_eq!(fmt_pat(&compiled.root), "[$v0, $v2]");
        assert_eq!(fmt_pat(&Pat::Rec(compiled.children[0].pat.clone())), "[$v1]");
        assert_eq!(fmt_pat(&Pat::Rec(compiled.children[1].pat.clone())), "[a]");
        assert_eq!(fmt_pat(&Pat::Rec(compiled.children[2].pat.clone())), "[b]");
    }

    #[test]
    fn wildcards_become_anonymous_captures() {
        let compiled = compile_str("'p'#[_, x, _, ...]");
        assert_eq!(fmt_pat(&compiled.root), "'p'#[$a0, x, $a1, ...]");
        assert!(compiled.children.is_empty());
    }

    #[test]
    fn escaped_label_and_feature() {
        let compiled = compile_str("~tag#{~key: ~value, 'n': 3}");
        assert_eq!(fmt_pat(&compiled.root), "~tag#{~key: ~value, 'n': 3}");
    }

    #[test]
    fn leaf_roots() {
        assert_eq!(compile_str("5").root, Pat::Lit(Lit::Int32(5)));
        assert_eq!(compile_str("-5").root, Pat::Lit(Lit::Int32(-5)));
        assert_eq!(compile_str("x").root, Pat::Ident(Ident::new("x")));
        assert_eq!(compile_str("~x").root, Pat::Escaped(Ident::new("x")));
        assert_eq!(compile_str("_").root, Pat::Ident(Ident::new("$a0")));
    }

    #[test]
    fn float_feature_is_rejected() {
        let err = compile(&pat_of("{1.5: x}"), &mut Names::default()).unwrap_err();
        assert!(matches!(err, GenError::InvalidPatternFeature { .. }));
        assert_eq!(err.to_string(), "A pattern feature must be a literal or an escaped identifier");
    }

    #[test]
    fn capture_feature_is_rejected() {
        let err = compile(&pat_of("{k: x}"), &mut Names::default()).unwrap_err();
        assert!(matches!(err, GenError::InvalidPatternFeature { .. }));
    }

    #[test]
    fn capture_label_is_rejected() {
        let err = compile(&pat_of("l#{'a': x}"), &mut Names::default()).unwrap_err();
        assert_eq!(err.to_string(), "A pattern label must be a literal or an escaped identifier");
        match err {
            GenError::InvalidPatternLabel { span } => assert_ne!(span, Span::UNKNOWN),
            other => panic!("unexpected {other:?}"),
        }
    }
}
