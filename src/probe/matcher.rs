//! Scanner and parser for the embedded probe micro-language.
//!
//! Probes are `[[...]]` occurrences in otherwise arbitrary source text. Each
//! occurrence is either an assignment (`$x:=Call`) or a probe
//! (`Type[idx].attr1.attr2(!~)=value`). The assignment grammar, the lenient
//! chain grammar and the strict (fully-consumed) chain grammar share one
//! parser so the three cannot drift apart; strictness is a parse flag.
//!
//! Every parsed component keeps its absolute column range so resolution
//! failures can be reported at the exact offending token.

use crate::position::LineCol;

/// A half-open column range `[start, end)` within one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSpan {
    pub start: u32,
    pub end: u32,
}

impl TokenSpan {
    pub fn new(start: u32, end: u32) -> Self {
        TokenSpan { start, end }
    }

    pub fn contains(&self, col: u32) -> bool {
        self.start <= col && col < self.end
    }

    /// Containment including the end column, for cursor positions sitting
    /// just past the last character of a token.
    pub fn contains_inclusive(&self, col: u32) -> bool {
        self.start <= col && col <= self.end
    }
}

/// An explicit disambiguation index, `[0]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIndex {
    pub value: usize,
    pub span: TokenSpan,
}

/// One attribute name in a dotted chain. The name may be empty while the
/// user is still typing (`Add.`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrName {
    pub name: String,
    pub span: TokenSpan,
}

/// Parsed left-hand side of a probe: a node target plus a dotted attribute
/// chain. The target is either a literal AST type name or a `$variable`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAndAttrChain {
    pub node_type: String,
    pub node_type_span: TokenSpan,
    pub node_index: Option<NodeIndex>,
    pub attr_names: Vec<AttrName>,
}

impl NodeAndAttrChain {
    pub fn is_variable(&self) -> bool {
        self.node_type.starts_with('$')
    }
}

/// Parsed comparison suffix: `(!?)(~?)(?:=value)?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub exclamation: bool,
    pub tilde: bool,
    pub expect_val: Option<String>,
    pub expect_span: Option<TokenSpan>,
}

/// One parsed probe occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeMatch {
    pub line: u32,
    /// Whole occurrence including the double brackets.
    pub span: TokenSpan,
    /// Inner content between the brackets.
    pub inner_span: TokenSpan,
    pub lhs: NodeAndAttrChain,
    pub rhs: Option<Comparison>,
}

impl ProbeMatch {
    /// A probe without an expected value is informational only.
    pub fn is_assertion(&self) -> bool {
        self.rhs
            .as_ref()
            .map(|rhs| rhs.expect_val.is_some())
            .unwrap_or(false)
    }
}

/// One parsed assignment occurrence, `[[$x:=srcVal]]`. `src_val` stays
/// unparsed at this stage; resolution re-parses it strictly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentMatch {
    pub line: u32,
    pub span: TokenSpan,
    /// Variable name including the leading `$`.
    pub var_name: String,
    pub var_span: TokenSpan,
    pub src_val: String,
    pub src_val_span: TokenSpan,
}

/// One classified `[[...]]` occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineMatch {
    Assignment(AssignmentMatch),
    Probe(ProbeMatch),
}

/// Per-document scan result: every assignment and probe, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FullFileMatch {
    pub lines: Vec<String>,
    pub assignments: Vec<AssignmentMatch>,
    pub probes: Vec<ProbeMatch>,
}

impl FullFileMatch {
    pub fn scan(text: &str) -> Self {
        let mut result = FullFileMatch::default();
        for (idx, line) in text.lines().enumerate() {
            result.lines.push(line.to_string());
            for found in scan_line(idx as u32, line) {
                match found {
                    LineMatch::Assignment(assignment) => result.assignments.push(assignment),
                    LineMatch::Probe(probe) => result.probes.push(probe),
                }
            }
        }
        result
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty() && self.probes.is_empty()
    }

    /// The probe or assignment whose bracketed span contains the position.
    pub fn match_at(&self, pos: LineCol) -> Option<LineMatch> {
        let probe = self
            .probes
            .iter()
            .find(|p| p.line == pos.line && p.span.contains_inclusive(pos.column))
            .cloned()
            .map(LineMatch::Probe);
        probe.or_else(|| {
            self.assignments
                .iter()
                .find(|a| a.line == pos.line && a.span.contains_inclusive(pos.column))
                .cloned()
                .map(LineMatch::Assignment)
        })
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Scans one line for non-overlapping `[[...]]` occurrences and classifies
/// each. Candidates with nested `[[`, or whose inner content does not start
/// with a word character or `$`, are skipped. Syntactically invalid inner
/// content produces no record at all.
pub fn scan_line(line_idx: u32, text: &str) -> Vec<LineMatch> {
    let chars: Vec<char> = text.chars().collect();
    let mut matches = Vec::new();
    let mut from = 0usize;

    while let Some(open) = find_seq(&chars, from, '[', '[') {
        let inner_start = open + 2;
        let Some(close) = select_close(&chars, inner_start) else {
            break;
        };
        from = close + 2;
        if find_seq(&chars[..close], inner_start, '[', '[').is_some() {
            // Nested `[[` disqualifies the candidate; rescan from inside it.
            from = inner_start;
            continue;
        }
        match chars.get(inner_start) {
            Some(&c) if is_word_char(c) || c == '$' => {}
            _ => continue,
        }

        let inner = &chars[inner_start..close];
        let span = TokenSpan::new(open as u32, (close + 2) as u32);
        let inner_span = TokenSpan::new(inner_start as u32, close as u32);

        if let Some(assignment) =
            parse_assignment(line_idx, inner, inner_start as u32, span)
        {
            matches.push(LineMatch::Assignment(assignment));
        } else if let Some((lhs, rhs)) =
            parse_chain_probe(inner, inner_start as u32, ParseMode::Lenient)
        {
            matches.push(LineMatch::Probe(ProbeMatch {
                line: line_idx,
                span,
                inner_span,
                lhs,
                rhs,
            }));
        }
    }
    matches
}

/// Picks the closing `]]` for a candidate opened at `inner_start - 2`.
///
/// Inner content may itself contain `]` (an index like `Call[1]`), so the
/// first `]]` is not always the terminator. The first close under which the
/// inner content parses in full wins; if none does, the first close stands
/// and lenient parsing deals with the remainder.
fn select_close(chars: &[char], inner_start: usize) -> Option<usize> {
    let first = find_seq(chars, inner_start, ']', ']')?;
    let mut candidate = first;
    loop {
        let inner = &chars[inner_start..candidate];
        let strict_ok = match parse_assignment(0, inner, 0, TokenSpan::new(0, 0)) {
            Some(assignment) => {
                let src: Vec<char> = assignment.src_val.chars().collect();
                parse_chain_only(&src, 0, ParseMode::Strict).is_some()
            }
            None => parse_chain_probe(inner, 0, ParseMode::Strict).is_some(),
        };
        if strict_ok {
            return Some(candidate);
        }
        match find_seq(chars, candidate + 1, ']', ']') {
            Some(next) => candidate = next,
            None => return Some(first),
        }
    }
}

/// Cursor-time variant of the scan: finds the `[[...]]` candidate containing
/// the given column and parses it leniently, tolerating a missing closing
/// `]]` and trailing garbage while the user is mid-edit.
pub fn lenient_match_at(line_idx: u32, text: &str, col: u32) -> Option<LineMatch> {
    let chars: Vec<char> = text.chars().collect();
    let mut best: Option<usize> = None;
    let mut from = 0usize;
    while let Some(open) = find_seq(&chars, from, '[', '[') {
        if open as u32 > col {
            break;
        }
        best = Some(open);
        from = open + 1;
    }
    let open = best?;
    let inner_start = open + 2;
    let close = select_close(&chars, inner_start);
    let inner_end = close.unwrap_or(chars.len());
    let region_end = close.map(|c| c + 2).unwrap_or(chars.len());
    if (col as usize) > region_end {
        return None;
    }
    match chars.get(inner_start) {
        Some(&c) if is_word_char(c) || c == '$' => {}
        _ => return None,
    }

    let inner = &chars[inner_start..inner_end];
    let span = TokenSpan::new(open as u32, region_end as u32);
    let inner_span = TokenSpan::new(inner_start as u32, inner_end as u32);

    if let Some(assignment) = parse_assignment(line_idx, inner, inner_start as u32, span) {
        return Some(LineMatch::Assignment(assignment));
    }
    parse_chain_probe(inner, inner_start as u32, ParseMode::Lenient).map(|(lhs, rhs)| {
        LineMatch::Probe(ProbeMatch { line: line_idx, span, inner_span, lhs, rhs })
    })
}

fn find_seq(chars: &[char], from: usize, a: char, b: char) -> Option<usize> {
    let mut i = from;
    while i + 1 < chars.len() {
        if chars[i] == a && chars[i + 1] == b {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Parse strictness. Lenient parses accept a valid prefix (used while the
/// user is mid-edit); strict parses must consume the whole input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Lenient,
    Strict,
}

/// Parses `$identifier := srcVal`. Returns `None` when the input is not an
/// assignment at all.
fn parse_assignment(
    line_idx: u32,
    inner: &[char],
    base: u32,
    span: TokenSpan,
) -> Option<AssignmentMatch> {
    let mut p = Parser::new(inner, base);
    let var_start = p.pos;
    if !p.eat('$') {
        return None;
    }
    let name_len = p.take_while(is_word_char).len();
    if name_len == 0 {
        return None;
    }
    let var_span = p.span_from(var_start);
    p.take_while(|c| c == ' ' || c == '\t');
    if !(p.eat(':') && p.eat('=')) {
        return None;
    }
    p.take_while(|c| c == ' ' || c == '\t');
    let src_start = p.pos;
    let src_val: String = inner[src_start..].iter().collect();
    let trimmed = src_val.trim_end();
    let src_val_span = TokenSpan::new(
        base + src_start as u32,
        base + src_start as u32 + trimmed.chars().count() as u32,
    );
    Some(AssignmentMatch {
        line: line_idx,
        span,
        var_name: inner[var_start..var_start + 1 + name_len].iter().collect(),
        var_span,
        src_val: trimmed.to_string(),
        src_val_span,
    })
}

/// Parses the chain grammar `(\$?\w+)(\[\d+\])?((?:\.\w*)*)` with its
/// optional comparison suffix `(!?)(~?)(?:=(.*))?`.
pub fn parse_chain_probe(
    inner: &[char],
    base: u32,
    mode: ParseMode,
) -> Option<(NodeAndAttrChain, Option<Comparison>)> {
    let mut p = Parser::new(inner, base);
    let lhs = p.parse_chain()?;
    let rhs = p.parse_comparison();
    if mode == ParseMode::Strict && !p.at_end() {
        return None;
    }
    Some((lhs, rhs))
}

/// Parses a chain only (no comparison suffix), as assignment source values
/// require.
pub fn parse_chain_only(inner: &[char], base: u32, mode: ParseMode) -> Option<NodeAndAttrChain> {
    let mut p = Parser::new(inner, base);
    let lhs = p.parse_chain()?;
    if mode == ParseMode::Strict && !p.at_end() {
        return None;
    }
    Some(lhs)
}

struct Parser<'a> {
    chars: &'a [char],
    pos: usize,
    base: u32,
}

impl<'a> Parser<'a> {
    fn new(chars: &'a [char], base: u32) -> Self {
        Parser { chars, pos: 0, base }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a [char] {
        let start = self.pos;
        while self.peek().map(&pred).unwrap_or(false) {
            self.pos += 1;
        }
        &self.chars[start..self.pos]
    }

    fn span_from(&self, start: usize) -> TokenSpan {
        TokenSpan::new(self.base + start as u32, self.base + self.pos as u32)
    }

    fn parse_chain(&mut self) -> Option<NodeAndAttrChain> {
        let target_start = self.pos;
        self.eat('$');
        let name = self.take_while(is_word_char);
        if name.is_empty() {
            return None;
        }
        let node_type: String = self.chars[target_start..self.pos].iter().collect();
        let node_type_span = self.span_from(target_start);

        let node_index = self.parse_index();
        let mut attr_names = Vec::new();
        while self.peek() == Some('.') {
            self.pos += 1;
            let name_start = self.pos;
            let name = self.take_while(is_word_char);
            attr_names.push(AttrName {
                name: name.iter().collect(),
                span: self.span_from(name_start),
            });
        }

        Some(NodeAndAttrChain { node_type, node_type_span, node_index, attr_names })
    }

    fn parse_index(&mut self) -> Option<NodeIndex> {
        if self.peek() != Some('[') {
            return None;
        }
        let checkpoint = self.pos;
        self.pos += 1;
        let digits = self.take_while(|c| c.is_ascii_digit());
        if digits.is_empty() || !self.eat(']') {
            self.pos = checkpoint;
            return None;
        }
        let value: usize = digits.iter().collect::<String>().parse().ok()?;
        Some(NodeIndex { value, span: self.span_from(checkpoint) })
    }

    fn parse_comparison(&mut self) -> Option<Comparison> {
        let exclamation = self.eat('!');
        let tilde = self.eat('~');
        let (expect_val, expect_span) = if self.eat('=') {
            let value_start = self.pos;
            let value: String = self.chars[self.pos..].iter().collect();
            self.pos = self.chars.len();
            (Some(value), Some(self.span_from(value_start)))
        } else {
            (None, None)
        };
        if !exclamation && !tilde && expect_val.is_none() {
            return None;
        }
        Some(Comparison { exclamation, tilde, expect_val, expect_span })
    }
}
