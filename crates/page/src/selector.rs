//! Minimal CSS selector support: selector lists of descendant chains built
//! from `tag`, `*`, `#id`, `.class`, `[attr]` and `[attr=value]`.

use crate::dom::{Dom, NodeIdx};
use crate::errors::PageError;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, Option<String>)>,
}

/// Parsed selector list; matches when any chain matches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selector {
    chains: Vec<Vec<Compound>>,
}

impl Selector {
    pub fn parse(input: &str) -> Result<Self, PageError> {
        let chains = input
            .split(',')
            .map(|chain| {
                let compounds = chain
                    .split_whitespace()
                    .map(|part| parse_compound(part, input))
                    .collect::<Result<Vec<_>, _>>()?;
                if compounds.is_empty() {
                    return Err(PageError::Selector(input.to_string()));
                }
                Ok(compounds)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { chains })
    }

    pub(crate) fn matches(&self, dom: &Dom, node: NodeIdx, scope: NodeIdx) -> bool {
        self.chains.iter().any(|chain| matches_chain(dom, node, scope, chain))
    }
}

fn parse_compound(part: &str, whole: &str) -> Result<Compound, PageError> {
    let invalid = || PageError::Selector(whole.to_string());
    let mut compound = Compound::default();
    let mut rest = part;

    let head_len = rest.find(['#', '.', '[']).unwrap_or(rest.len());
    let head = &rest[..head_len];
    if !head.is_empty() && head != "*" {
        if !head.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(invalid());
        }
        compound.tag = Some(head.to_ascii_lowercase());
    }
    rest = &rest[head_len..];

    while let Some(first) = rest.chars().next() {
        match first {
            '#' | '.' => {
                let body = &rest[1..];
                let end = body.find(['#', '.', '[']).unwrap_or(body.len());
                let name = &body[..end];
                if name.is_empty() {
                    return Err(invalid());
                }
                if first == '#' {
                    compound.id = Some(name.to_string());
                } else {
                    compound.classes.push(name.to_string());
                }
                rest = &body[end..];
            }
            '[' => {
                let end = rest.find(']').ok_or_else(invalid)?;
                let inner = &rest[1..end];
                let attr = match inner.split_once('=') {
                    Some((name, value)) => (
                        name.trim().to_string(),
                        Some(value.trim().trim_matches(|c| c == '"' || c == '\'').to_string()),
                    ),
                    None => (inner.trim().to_string(), None),
                };
                if attr.0.is_empty() {
                    return Err(invalid());
                }
                compound.attrs.push(attr);
                rest = &rest[end + 1..];
            }
            _ => return Err(invalid()),
        }
    }
    Ok(compound)
}

fn matches_compound(dom: &Dom, node: NodeIdx, compound: &Compound) -> bool {
    let Some(tag) = dom.tag(node) else {
        return false;
    };
    if compound.tag.as_deref().is_some_and(|expected| expected != tag) {
        return false;
    }
    if compound
        .id
        .as_deref()
        .is_some_and(|expected| dom.attr(node, "id") != Some(expected))
    {
        return false;
    }
    if !compound.classes.iter().all(|class| dom.has_class(node, class)) {
        return false;
    }
    compound.attrs.iter().all(|(name, value)| match value {
        Some(value) => dom.attr(node, name) == Some(value.as_str()),
        None => dom.has_attr(node, name),
    })
}

fn matches_chain(dom: &Dom, node: NodeIdx, scope: NodeIdx, chain: &[Compound]) -> bool {
    let Some((last, ancestors)) = chain.split_last() else {
        return false;
    };
    if !matches_compound(dom, node, last) {
        return false;
    }
    let mut cursor = dom.parent(node);
    let mut remaining = ancestors.iter().rev().peekable();
    while let Some(compound) = remaining.peek() {
        let Some(idx) = cursor else {
            return false;
        };
        if idx == scope && scope != crate::dom::ROOT {
            return false;
        }
        if matches_compound(dom, idx, compound) {
            remaining.next();
        }
        cursor = dom.parent(idx);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select(html: &str, selector: &str) -> Vec<String> {
        let dom = Dom::parse(html).unwrap();
        let selector = Selector::parse(selector).unwrap();
        dom.elements(crate::dom::ROOT)
            .filter(|idx| selector.matches(&dom, *idx, crate::dom::ROOT))
            .filter_map(|idx| dom.attr(idx, "id").map(str::to_string))
            .collect()
    }

    #[test]
    fn descendant_and_class_selectors() {
        let html = "<div id=a><span id=s1 class='b x'></span></div><span id=s2 class=b></span>";
        assert_eq!(select(html, "#a .b"), vec!["s1"]);
        assert_eq!(select(html, "span.b"), vec!["s1", "s2"]);
        assert_eq!(select(html, "span.b.x, #a"), vec!["a", "s1"]);
    }

    #[test]
    fn attribute_selectors() {
        let html = "<input id=i1 name=q type=text><input id=i2 type=checkbox>";
        assert_eq!(select(html, "input[type=checkbox]"), vec!["i2"]);
        assert_eq!(select(html, "[name]"), vec!["i1"]);
    }

    #[test]
    fn rejects_garbage() {
        assert!(Selector::parse("div > p").is_err());
        assert!(Selector::parse("#").is_err());
        assert!(Selector::parse("").is_err());
    }
}
