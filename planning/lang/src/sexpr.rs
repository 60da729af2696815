//! S-expressions annotated with their location in the source.
//!
//! Atoms are lower-cased as PDDL is case-insensitive. The original text remains accessible
//! through the span of each atom.

use crate::errors::*;
use crate::input::Input;
use crate::Sym;
use itertools::Itertools;
use std::fmt::{Display, Formatter};

pub type SAtom = Sym;

#[derive(Clone)]
pub struct SList {
    list: Vec<SExpr>,
    span: Span,
}

impl SList {
    pub fn iter(&self) -> ListIter<'_> {
        ListIter {
            elems: self.list.as_slice(),
            span: &self.span,
        }
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn loc(&self) -> Span {
        self.span.clone()
    }
}

#[derive(Clone)]
pub enum SExpr {
    Atom(SAtom),
    List(SList),
}

impl SExpr {
    /// Returns true if this expression is an atom with the given canonical value.
    pub fn is_atom(&self, expected: &str) -> bool {
        self.as_atom().is_some_and(|a| a.canonical_str() == expected)
    }

    pub fn as_atom(&self) -> Option<&SAtom> {
        match self {
            SExpr::Atom(a) => Some(a),
            SExpr::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&SList> {
        match self {
            SExpr::Atom(_) => None,
            SExpr::List(l) => Some(l),
        }
    }

    pub fn as_list_iter(&self) -> Option<ListIter<'_>> {
        self.as_list().map(|l| l.iter())
    }

    /// If this expression is a list whose first element is the atom `function_name`,
    /// returns the remaining elements.
    pub fn as_application(&self, function_name: &str) -> Option<&[SExpr]> {
        match self {
            SExpr::List(l) => match l.list.first() {
                Some(SExpr::Atom(head)) if head.canonical_str() == function_name => Some(&l.list[1..]),
                _ => None,
            },
            SExpr::Atom(_) => None,
        }
    }
}

impl Spanned for SExpr {
    fn span(&self) -> Option<&Span> {
        match self {
            SExpr::Atom(a) => a.span.as_ref(),
            SExpr::List(l) => Some(&l.span),
        }
    }
}

impl Spanned for &SExpr {
    fn span(&self) -> Option<&Span> {
        (*self).span()
    }
}

impl Display for SExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SExpr::Atom(a) => write!(f, "{}", a.canonical_str()),
            SExpr::List(l) => write!(f, "({})", l.list.iter().format(" ")),
        }
    }
}

impl std::fmt::Debug for SExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

/// Cursor over the elements of a list, producing localized errors when the list does not have the expected shape.
#[derive(Clone)]
pub struct ListIter<'a> {
    elems: &'a [SExpr],
    span: &'a Span,
}

impl<'a> ListIter<'a> {
    pub fn peek(&self) -> Option<&'a SExpr> {
        self.elems.first()
    }

    pub fn len(&self) -> usize {
        self.elems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    /// Location of the entire list being iterated on.
    pub fn loc(&self) -> Span {
        self.span.clone()
    }

    pub fn pop(&mut self) -> Res<&'a SExpr> {
        match self.elems.split_first() {
            Some((head, tail)) => {
                self.elems = tail;
                Ok(head)
            }
            None => Err(self.span.clone().end().invalid("Unexpected end of list")),
        }
    }

    pub fn pop_atom(&mut self) -> Res<&'a SAtom> {
        let e = self.pop()?;
        e.as_atom().ok_or_else(|| e.invalid("Expected an atom"))
    }

    /// Pops the next element and checks that it is the given atom.
    pub fn pop_known_atom(&mut self, expected: &str) -> Res<()> {
        let e = self.pop()?;
        if e.is_atom(expected) {
            Ok(())
        } else {
            Err(e.invalid(format!("Expected the atom `{expected}`")))
        }
    }

    pub fn pop_list(&mut self) -> Res<&'a SList> {
        let e = self.pop()?;
        e.as_list().ok_or_else(|| e.invalid("Expected a list"))
    }
}

impl<'a> Iterator for ListIter<'a> {
    type Item = &'a SExpr;

    fn next(&mut self) -> Option<Self::Item> {
        let (head, tail) = self.elems.split_first()?;
        self.elems = tail;
        Some(head)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Token {
    Sym { start: usize, end: usize },
    LParen(usize),
    RParen(usize),
}

fn tokenize(input: &Input) -> Vec<Token> {
    let text = input.text();
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();
    let mut sym_start: Option<usize> = None;
    while let Some((i, c)) = chars.next() {
        if c == ';' || c.is_whitespace() || c == '(' || c == ')' {
            if let Some(start) = sym_start.take() {
                tokens.push(Token::Sym { start, end: i });
            }
            match c {
                ';' => {
                    // comment: drop everything until the end of line
                    while chars.next_if(|&(_, c)| c != '\n').is_some() {}
                }
                '(' => tokens.push(Token::LParen(i)),
                ')' => tokens.push(Token::RParen(i)),
                _ => {}
            }
        } else if sym_start.is_none() {
            sym_start = Some(i);
        }
    }
    if let Some(start) = sym_start {
        tokens.push(Token::Sym { start, end: text.len() });
    }
    tokens
}

fn read(tokens: &mut std::iter::Peekable<std::slice::Iter<Token>>, src: &Input) -> Res<SExpr> {
    match tokens.next() {
        Some(&Token::Sym { start, end }) => {
            let span = Span::with_range(src.clone(), start..end);
            let canonical = span.str().to_ascii_lowercase();
            Ok(SExpr::Atom(Sym::with_source(canonical, span)))
        }
        Some(&Token::LParen(start)) => {
            let mut es = Vec::new();
            loop {
                match tokens.peek() {
                    Some(&&Token::RParen(end)) => {
                        tokens.next();
                        return Ok(SExpr::List(SList {
                            list: es,
                            span: Span::new(src.clone(), start, end),
                        }));
                    }
                    Some(_) => es.push(read(tokens, src)?),
                    None => {
                        return Err(Span::new(src.clone(), start, start).invalid("Unclosed parenthesis"));
                    }
                }
            }
        }
        Some(&Token::RParen(pos)) => Err(Span::new(src.clone(), pos, pos).invalid("Unexpected closing parenthesis")),
        None => Err(Message::error("Unexpected end of input")),
    }
}

/// Parses a single s-expression that must span the entire input.
pub fn parse(src: Input) -> Res<SExpr> {
    let tokens = tokenize(&src);
    let mut tokens = tokens.iter().peekable();
    let expr = read(&mut tokens, &src)?;
    match tokens.next() {
        None => Ok(expr),
        Some(&Token::Sym { start, end }) => {
            Err(Span::with_range(src.clone(), start..end).invalid("Unexpected token after the end of the expression"))
        }
        Some(&Token::LParen(p)) | Some(&Token::RParen(p)) => {
            Err(Span::new(src.clone(), p, p).invalid("Unexpected token after the end of the expression"))
        }
    }
}

/// Parses a sequence of s-expressions.
pub fn parse_many(src: Input) -> Res<Vec<SExpr>> {
    let tokens = tokenize(&src);
    let mut tokens = tokens.iter().peekable();
    let mut exprs = Vec::new();
    while tokens.peek().is_some() {
        exprs.push(read(&mut tokens, &src)?);
    }
    Ok(exprs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(s: &str) -> Res<SExpr> {
        parse(Input::from_string(s))
    }

    #[test]
    fn parse_nested_lists() {
        let e = parse_str("(define (Domain Blocks) ; comment (ignored\n  (:requirements :strips))").unwrap();
        assert_eq!(e.to_string(), "(define (domain blocks) (:requirements :strips))");
        let mut it = e.as_list_iter().unwrap();
        it.pop_known_atom("define").unwrap();
        let mut name = it.pop_list().unwrap().iter();
        name.pop_known_atom("domain").unwrap();
        let name = name.pop_atom().unwrap();
        assert_eq!(name.canonical_str(), "blocks");
        // display keeps the original capitalization
        assert_eq!(name.to_string(), "Blocks");
        assert!(it.pop().unwrap().as_application(":requirements").is_some());
        assert!(it.pop().is_err());
    }

    #[test]
    fn parse_errors() {
        assert!(parse_str("(a (b c)").is_err());
        assert!(parse_str("(a b))").is_err());
        assert!(parse_str(")").is_err());
        assert!(parse_str("").is_err());
    }

    #[test]
    fn many_expressions() {
        let es = parse_many(Input::from_string("(move a b)\n(move b c) ; cost = 2")).unwrap();
        assert_eq!(es.len(), 2);
        assert_eq!(es[1].to_string(), "(move b c)");
    }
}
