//! CSS selector subset for the in-memory page tree.
//!
//! Supports what site rules use in practice: type, universal, id, class and
//! attribute selectors (`[a]`, `[a=v]`, `~=`, `|=`, `^=`, `$=`, `*=`),
//! compound sequences, selector lists, and the descendant and child
//! combinators. Anything else is reported as unsupported so the caller can
//! skip that one selector.

/// Error type for selector parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("Empty selector")]
    Empty,
    #[error("Invalid selector `{selector}` at offset {offset}")]
    Invalid { selector: String, offset: usize },
    #[error("Unsupported selector `{selector}`: {reason}")]
    Unsupported { selector: String, reason: &'static str },
    #[error("Selector `{selector}` rejected: {message}")]
    Rejected { selector: String, message: String },
}

/// DOM access needed for matching.
pub trait ElementAdapter {
    type Handle: Copy;

    /// Parent element, if the parent is an element.
    fn parent(&self, element: Self::Handle) -> Option<Self::Handle>;

    /// Tag name in ASCII lowercase.
    fn tag_name(&self, element: Self::Handle) -> &str;

    fn attr(&self, element: Self::Handle, name: &str) -> Option<&str>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrOp {
    Exists,
    Equals,
    Includes,
    DashMatch,
    Prefix,
    Suffix,
    Substring,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimpleSelector {
    Universal,
    Type(String),
    Id(String),
    Class(String),
    Attr { name: String, op: AttrOp, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    Descendant,
    Child,
}

/// Simple selectors that all apply to the same element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompoundSelector {
    pub simples: Vec<SimpleSelector>,
}

/// Compounds joined by combinators. `combinators[i]` sits between
/// `compounds[i]` and `compounds[i + 1]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexSelector {
    pub compounds: Vec<CompoundSelector>,
    pub combinators: Vec<Combinator>,
}

/// Comma-separated selectors; an element matches if any of them does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList {
    pub selectors: Vec<ComplexSelector>,
}

impl SelectorList {
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        if input.trim().is_empty() {
            return Err(SelectorError::Empty);
        }
        Parser::new(input).parse_list()
    }

    pub fn matches<A: ElementAdapter>(&self, adapter: &A, element: A::Handle) -> bool {
        self.selectors
            .iter()
            .any(|selector| matches_complex(adapter, element, selector))
    }
}

// =============================================================================
// Matching
// =============================================================================

fn matches_complex<A: ElementAdapter>(adapter: &A, element: A::Handle, sel: &ComplexSelector) -> bool {
    match sel.compounds.len() {
        0 => false,
        n => matches_from(adapter, element, sel, n - 1),
    }
}

/// Right-to-left: `element` must match `compounds[index]` and its ancestors
/// the compounds to the left.
fn matches_from<A: ElementAdapter>(
    adapter: &A,
    element: A::Handle,
    sel: &ComplexSelector,
    index: usize,
) -> bool {
    if !matches_compound(adapter, element, &sel.compounds[index]) {
        return false;
    }
    if index == 0 {
        return true;
    }
    match sel.combinators[index - 1] {
        Combinator::Child => adapter
            .parent(element)
            .is_some_and(|parent| matches_from(adapter, parent, sel, index - 1)),
        Combinator::Descendant => {
            let mut current = adapter.parent(element);
            while let Some(ancestor) = current {
                if matches_from(adapter, ancestor, sel, index - 1) {
                    return true;
                }
                current = adapter.parent(ancestor);
            }
            false
        }
    }
}

fn matches_compound<A: ElementAdapter>(
    adapter: &A,
    element: A::Handle,
    compound: &CompoundSelector,
) -> bool {
    compound.simples.iter().all(|simple| match simple {
        SimpleSelector::Universal => true,
        SimpleSelector::Type(name) => adapter.tag_name(element) == name,
        SimpleSelector::Id(id) => adapter.attr(element, "id") == Some(id.as_str()),
        SimpleSelector::Class(class) => adapter
            .attr(element, "class")
            .is_some_and(|classes| classes.split_ascii_whitespace().any(|c| c == class)),
        SimpleSelector::Attr { name, op, value } => adapter
            .attr(element, name)
            .is_some_and(|actual| attr_matches(*op, actual, value)),
    })
}

fn attr_matches(op: AttrOp, actual: &str, expected: &str) -> bool {
    match op {
        AttrOp::Exists => true,
        AttrOp::Equals => actual == expected,
        AttrOp::Includes => actual.split_ascii_whitespace().any(|word| word == expected),
        AttrOp::DashMatch => {
            actual == expected
                || (actual.starts_with(expected) && actual[expected.len()..].starts_with('-'))
        }
        AttrOp::Prefix => !expected.is_empty() && actual.starts_with(expected),
        AttrOp::Suffix => !expected.is_empty() && actual.ends_with(expected),
        AttrOp::Substring => !expected.is_empty() && actual.contains(expected),
    }
}

// =============================================================================
// Parsing
// =============================================================================

struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn invalid(&self) -> SelectorError {
        SelectorError::Invalid {
            selector: self.source.to_string(),
            offset: self.pos,
        }
    }

    fn unsupported(&self, reason: &'static str) -> SelectorError {
        SelectorError::Unsupported {
            selector: self.source.to_string(),
            reason,
        }
    }

    /// Skip whitespace; true if any was skipped.
    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn parse_list(&mut self) -> Result<SelectorList, SelectorError> {
        let mut selectors = Vec::new();
        loop {
            self.skip_whitespace();
            selectors.push(self.parse_complex()?);
            self.skip_whitespace();
            match self.peek() {
                None => break,
                Some(',') => self.pos += 1,
                Some(_) => return Err(self.invalid()),
            }
        }
        Ok(SelectorList { selectors })
    }

    fn parse_complex(&mut self) -> Result<ComplexSelector, SelectorError> {
        let mut compounds = vec![self.parse_compound()?];
        let mut combinators = Vec::new();
        loop {
            let had_whitespace = self.skip_whitespace();
            let combinator = match self.peek() {
                None | Some(',') => break,
                Some('>') => {
                    self.pos += 1;
                    self.skip_whitespace();
                    Combinator::Child
                }
                Some('+') | Some('~') => return Err(self.unsupported("sibling combinators")),
                Some(_) if had_whitespace => Combinator::Descendant,
                Some(_) => return Err(self.invalid()),
            };
            combinators.push(combinator);
            compounds.push(self.parse_compound()?);
        }
        Ok(ComplexSelector {
            compounds,
            combinators,
        })
    }

    fn parse_compound(&mut self) -> Result<CompoundSelector, SelectorError> {
        let mut simples = Vec::new();
        match self.peek() {
            Some('*') => {
                self.pos += 1;
                simples.push(SimpleSelector::Universal);
            }
            Some(c) if is_ident_char(c) => {
                let name = self.parse_ident()?;
                simples.push(SimpleSelector::Type(name.to_ascii_lowercase()));
            }
            _ => {}
        }
        loop {
            match self.peek() {
                Some('#') => {
                    self.pos += 1;
                    simples.push(SimpleSelector::Id(self.parse_ident()?));
                }
                Some('.') => {
                    self.pos += 1;
                    simples.push(SimpleSelector::Class(self.parse_ident()?));
                }
                Some('[') => {
                    self.pos += 1;
                    simples.push(self.parse_attribute()?);
                }
                Some(':') => return Err(self.unsupported("pseudo-classes and pseudo-elements")),
                Some('\\') => return Err(self.unsupported("escaped identifiers")),
                _ => break,
            }
        }
        if simples.is_empty() {
            return Err(self.invalid());
        }
        Ok(CompoundSelector { simples })
    }

    fn parse_ident(&mut self) -> Result<String, SelectorError> {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.pos += 1;
        }
        if self.peek() == Some('\\') {
            return Err(self.unsupported("escaped identifiers"));
        }
        if self.pos == start {
            return Err(self.invalid());
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn parse_attribute(&mut self) -> Result<SimpleSelector, SelectorError> {
        self.skip_whitespace();
        let name = self.parse_ident()?.to_ascii_lowercase();
        self.skip_whitespace();

        let op = match self.peek() {
            Some(']') => {
                self.pos += 1;
                return Ok(SimpleSelector::Attr {
                    name,
                    op: AttrOp::Exists,
                    value: String::new(),
                });
            }
            Some('=') => AttrOp::Equals,
            Some('~') => AttrOp::Includes,
            Some('|') => AttrOp::DashMatch,
            Some('^') => AttrOp::Prefix,
            Some('$') => AttrOp::Suffix,
            Some('*') => AttrOp::Substring,
            _ => return Err(self.invalid()),
        };
        self.pos += 1;
        if op != AttrOp::Equals {
            if self.peek() != Some('=') {
                return Err(self.invalid());
            }
            self.pos += 1;
        }

        self.skip_whitespace();
        let value = match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let start = self.pos;
                while self.peek().is_some_and(|c| c != quote) {
                    self.pos += 1;
                }
                if self.peek().is_none() {
                    return Err(self.invalid());
                }
                let value: String = self.chars[start..self.pos].iter().collect();
                self.pos += 1;
                value
            }
            _ => self.parse_ident()?,
        };

        self.skip_whitespace();
        if self.peek() != Some(']') {
            return Err(self.invalid());
        }
        self.pos += 1;
        Ok(SimpleSelector::Attr { name, op, value })
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compound() {
        let list = SelectorList::parse("div#addr.box.primary").unwrap();
        assert_eq!(
            list.selectors[0].compounds[0].simples,
            vec![
                SimpleSelector::Type("div".into()),
                SimpleSelector::Id("addr".into()),
                SimpleSelector::Class("box".into()),
                SimpleSelector::Class("primary".into()),
            ]
        );
    }

    #[test]
    fn test_parse_custom_element_and_attribute() {
        let list = SelectorList::parse("update-location").unwrap();
        assert_eq!(
            list.selectors[0].compounds[0].simples,
            vec![SimpleSelector::Type("update-location".into())]
        );

        let list = SelectorList::parse(r#"[data-component="shippingAddress"]"#).unwrap();
        assert_eq!(
            list.selectors[0].compounds[0].simples,
            vec![SimpleSelector::Attr {
                name: "data-component".into(),
                op: AttrOp::Equals,
                value: "shippingAddress".into(),
            }]
        );
    }

    #[test]
    fn test_parse_combinators_and_lists() {
        let list = SelectorList::parse("nav > .a span, #b").unwrap();
        assert_eq!(list.selectors.len(), 2);
        assert_eq!(
            list.selectors[0].combinators,
            vec![Combinator::Child, Combinator::Descendant]
        );
        assert_eq!(list.selectors[0].compounds.len(), 3);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(SelectorList::parse("  "), Err(SelectorError::Empty));
        assert!(matches!(
            SelectorList::parse("a:hover"),
            Err(SelectorError::Unsupported { .. })
        ));
        assert!(matches!(
            SelectorList::parse("a + b"),
            Err(SelectorError::Unsupported { .. })
        ));
        assert!(matches!(SelectorList::parse("[x"), Err(SelectorError::Invalid { .. })));
        assert!(matches!(SelectorList::parse("a,"), Err(SelectorError::Invalid { .. })));
        assert!(matches!(SelectorList::parse("!!"), Err(SelectorError::Invalid { .. })));
    }

    #[test]
    fn test_attr_ops() {
        assert!(attr_matches(AttrOp::Includes, "a b c", "b"));
        assert!(attr_matches(AttrOp::DashMatch, "en-US", "en"));
        assert!(!attr_matches(AttrOp::DashMatch, "english", "en"));
        assert!(attr_matches(AttrOp::Prefix, "shippingAddress", "shipping"));
        assert!(attr_matches(AttrOp::Suffix, "shippingAddress", "Address"));
        assert!(attr_matches(AttrOp::Substring, "shippingAddress", "pingA"));
        assert!(!attr_matches(AttrOp::Substring, "x", ""));
    }
}
