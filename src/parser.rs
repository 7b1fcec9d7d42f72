//! Query-language parser.
//!
//! [`QueryParser::parse`] turns a raw search string into a
//! [`TermCluster`] tree plus extracted [`Modifiers`]. The pipeline is
//! strictly staged; each stage consumes the previous stage's output:
//!
//! 1. clean the raw string and isolate delimiter characters
//! 2. check (and by default repair) quote and parenthesis balance
//! 3. extract brace-wrapped modifiers
//! 4. normalize: case, rewrites, phrase and field-group expansion,
//!    default operator insertion
//! 5. build the cluster tree
//! 6. reject a bare `NOT <term>` query
//! 7. cache the normalized and fully-normalized search texts

pub mod dates;
pub mod modifiers;
pub mod term;

use aho_corasick::AhoCorasick;
use chrono::NaiveDate;
use lazy_static::lazy_static;

use crate::error::{CallunaError, Result};
use crate::language::tokenizer::is_undelimited_char;
use crate::parser::modifiers::{Modifiers, OperatorCase, SearchType, TermCase};
use crate::parser::term::{
    has_unescaped_wildcard, Child, FunctionId, Operator, ParsedTerm, ParserFilter, ParserNumber,
    RangeOp, TermCluster, WILDCARD_CHARS,
};

/// Per-error-class behavior. The default configuration repairs instead
/// of rejecting wherever a repair exists.
#[derive(Debug, Clone)]
pub struct ParserPolicy {
    pub reject_unbalanced_quotes: bool,
    pub reject_unbalanced_parens: bool,
    pub reject_unbalanced_brackets: bool,
    /// Discard a leading run of wildcards from a term.
    pub strip_leading_wildcards: bool,
    /// Reject (instead of silently dropping) a term that is nothing but
    /// wildcards.
    pub reject_all_wildcard_terms: bool,
}

impl Default for ParserPolicy {
    fn default() -> Self {
        ParserPolicy {
            reject_unbalanced_quotes: false,
            reject_unbalanced_parens: false,
            reject_unbalanced_brackets: false,
            strip_leading_wildcards: true,
            reject_all_wildcard_terms: false,
        }
    }
}

/// Parser construction-time configuration: the modifier defaults and the
/// repair policy. Passed in explicitly; the parser treats it as
/// read-only for its lifetime.
#[derive(Debug, Clone, Default)]
pub struct ParserConfig {
    pub defaults: Modifiers,
    pub policy: ParserPolicy,
}

/// The query-language parser.
///
/// A parser owns the tree and normalized texts of its most recent parse
/// until the next [`parse`](QueryParser::parse) or
/// [`reset`](QueryParser::reset).
#[derive(Debug)]
pub struct QueryParser {
    config: ParserConfig,
    modifiers: Modifiers,
    cluster: Option<TermCluster>,
    normalized_search_text: String,
    full_normalized_search_text: String,
    search_term_count: u32,
}

impl QueryParser {
    /// Create a parser with explicit configuration.
    pub fn new(config: ParserConfig) -> Self {
        let modifiers = config.defaults.clone();
        QueryParser {
            config,
            modifiers,
            cluster: None,
            normalized_search_text: String::new(),
            full_normalized_search_text: String::new(),
            search_term_count: 0,
        }
    }

    /// Parse a search string.
    ///
    /// `language_id` and `tokenizer_id` identify the linguistic context
    /// of the index being searched; the shipped normalization only needs
    /// them for interface parity.
    pub fn parse(
        &mut self,
        _language_id: u32,
        _tokenizer_id: u32,
        search_text: &str,
    ) -> Result<()> {
        self.parse_at(search_text, chrono::Local::now().date_naive())
    }

    /// Parse with an explicit reference date for natural-language date
    /// values.
    pub fn parse_at(&mut self, search_text: &str, today: NaiveDate) -> Result<()> {
        self.reset();

        let result = self.parse_stages(search_text, today);
        if result.is_err() {
            // A non-recoverable error leaves the parser reset.
            self.reset();
        }
        result
    }

    fn parse_stages(&mut self, search_text: &str, today: NaiveDate) -> Result<()> {
        // Stage 1: clean.
        let cleaned = clean(search_text);
        let mut tokens: Vec<String> = cleaned.split_whitespace().map(str::to_string).collect();

        // Stage 2: syntax check and repair.
        check_balance(&mut tokens, &self.config.policy)?;

        // Stage 3: extract modifiers.
        tokens = self.extract_modifiers(tokens, today)?;

        // Stage 4: normalize.
        let tokens = self.normalize(tokens)?;
        self.normalized_search_text = detokenize(&tokens);

        // Stage 5 and 6: build the cluster tree.
        self.cluster = self.build_root(&tokens)?;
        self.search_term_count = self.cluster.as_ref().map(|c| c.term_count()).unwrap_or(0);

        // Stage 7: cache the fully-normalized text.
        let rendered = self.modifiers.render();
        let mut full = self.normalized_search_text.clone();
        if !rendered.is_empty() {
            if !full.is_empty() {
                full.push(' ');
            }
            full.push_str(&rendered.join(" "));
        }
        self.full_normalized_search_text = full;

        Ok(())
    }

    /// Free the last parse, keeping the construction-time defaults.
    pub fn reset(&mut self) {
        self.modifiers = self.config.defaults.clone();
        self.cluster = None;
        self.normalized_search_text.clear();
        self.full_normalized_search_text.clear();
        self.search_term_count = 0;
    }

    // -- Results of the last parse --

    pub fn term_cluster(&self) -> Option<&TermCluster> {
        self.cluster.as_ref()
    }

    pub fn modifiers(&self) -> &Modifiers {
        &self.modifiers
    }

    pub fn dates(&self) -> &[ParserNumber] {
        &self.modifiers.dates
    }

    pub fn exclusion_filters(&self) -> &[ParserFilter] {
        &self.modifiers.exclusion_filters
    }

    pub fn inclusion_filters(&self) -> &[ParserFilter] {
        &self.modifiers.inclusion_filters
    }

    pub fn languages(&self) -> &[ParserNumber] {
        &self.modifiers.languages
    }

    pub fn search_term_count(&self) -> u32 {
        self.search_term_count
    }

    /// The canonical normalized query text, one of the two cache keys.
    pub fn normalized_search_text(&self) -> &str {
        &self.normalized_search_text
    }

    /// The normalized text with every extracted modifier rendered back.
    pub fn full_normalized_search_text(&self) -> &str {
        &self.full_normalized_search_text
    }

    // -- Stage 3 --

    fn extract_modifiers(&mut self, tokens: Vec<String>, today: NaiveDate) -> Result<Vec<String>> {
        let mut remaining = Vec::with_capacity(tokens.len());
        let mut iter = tokens.into_iter();

        while let Some(token) = iter.next() {
            if token == "}" {
                // Stray closer, dropped by the repair policy.
                continue;
            }
            if token != "{" {
                remaining.push(token);
                continue;
            }
            let mut body = String::new();
            for inner in iter.by_ref() {
                if inner == "}" {
                    break;
                }
                body.push_str(&inner);
            }
            self.modifiers.apply(&body, today)?;
        }

        Ok(remaining)
    }

    // -- Stage 4 --

    fn normalize(&self, tokens: Vec<String>) -> Result<Vec<String>> {
        let tokens = merge_bracket_literals(tokens);
        let tokens = self.canonicalize_case(tokens);
        let tokens = rewrite_tokens(tokens);
        let tokens = expand_undelimited(tokens);
        let tokens = convert_phrases(tokens);
        let tokens = distribute_field_groups(tokens);
        let tokens = apply_replacements(tokens);
        let tokens = if self.modifiers.search_type == SearchType::Boolean {
            insert_default_operator(tokens, self.modifiers.boolean_operator)
        } else {
            tokens
        };
        Ok(tokens)
    }

    fn canonicalize_case(&self, tokens: Vec<String>) -> Vec<String> {
        tokens
            .into_iter()
            .map(|token| {
                if token == "(" || token == ")" || token == "\"" {
                    return token;
                }
                if let Some(canonical) =
                    canonical_operator_token(&token, self.modifiers.operator_case)
                {
                    return canonical;
                }
                match self.modifiers.term_case {
                    TermCase::Drop => lowercase_term_token(&token),
                    TermCase::Keep => token,
                }
            })
            .collect()
    }

    // -- Stage 5 --

    fn build_root(&self, tokens: &[String]) -> Result<Option<TermCluster>> {
        if tokens.is_empty() {
            return Ok(None);
        }
        let default_operator = match self.modifiers.search_type {
            SearchType::Boolean => self.modifiers.boolean_operator,
            SearchType::Freetext => Operator::Or,
        };
        let mut position = 0usize;
        let cluster = self.build_cluster(tokens, &mut position, default_operator)?;
        if cluster.children.is_empty() {
            return Ok(None);
        }
        Ok(Some(collapse(cluster)))
    }

    fn build_cluster(
        &self,
        tokens: &[String],
        position: &mut usize,
        default_operator: Operator,
    ) -> Result<TermCluster> {
        let mut cluster = TermCluster::new(default_operator);
        let mut operator_was_set = false;

        while *position < tokens.len() {
            let token = &tokens[*position];
            *position += 1;

            if token == "(" {
                let nested = self.build_cluster(tokens, position, default_operator)?;
                // The matching ")" was consumed by the nested call. An
                // empty cluster is pruned.
                if !nested.children.is_empty() {
                    cluster.children.push(Child::Cluster(collapse(nested)));
                }
                continue;
            }
            if token == ")" {
                break;
            }

            if let Some((operator, distance)) = parse_operator_token(token)? {
                if operator_was_set
                    && cluster.operator != operator
                    && self.modifiers.boolean_operation
                        == crate::parser::modifiers::BooleanOperation::Strict
                {
                    return Err(CallunaError::InvalidOperator);
                }
                cluster.operator = operator;
                operator_was_set = true;
                if let Some((value, order_matters)) = distance {
                    cluster.distance = value;
                    cluster.order_matters = order_matters;
                }
                continue;
            }

            if let Some(parsed) = self.parse_term(token)? {
                push_term(&mut cluster, parsed);
            }
        }

        if cluster.operator == Operator::Not && cluster.children.len() < 2 {
            return Err(CallunaError::InvalidNotOperator);
        }

        Ok(cluster)
    }

    fn parse_term(&self, token: &str) -> Result<Option<ParsedTerm>> {
        let mut text = token.to_string();
        let mut parsed = ParsedTerm::default();

        if text.starts_with('+') && text.len() > 1 {
            parsed.required = true;
            text.remove(0);
        }

        // Field prefix: the earliest unescaped range operator splits
        // field name from term.
        if let Some((at, range, length)) = find_range_op(&text) {
            if at > 0 && !text[..at].contains('[') {
                parsed.field_name = Some(text[..at].to_string());
                parsed.range = range;
                text = text[at + length..].to_string();
            }
        }

        // Function envelope or weight suffix.
        if let Some(open) = text.find('[') {
            if open > 0 && text.ends_with(']') {
                let name = text[..open].to_string();
                let inner = text[open + 1..text.len() - 1].to_string();
                if let Some(function) = FunctionId::from_name(&name.to_lowercase()) {
                    parsed.function = Some(function);
                    text = inner;
                } else if let Ok(weight) = inner.parse::<f32>() {
                    parsed.weight = weight;
                    text = name;
                }
            }
        }

        // Literal and regex keep their spelling and never wildcard.
        let literal_like = matches!(
            parsed.function,
            Some(FunctionId::Literal) | Some(FunctionId::Regex)
        );
        if !literal_like && has_unescaped_wildcard(&text) {
            parsed.wildcard = true;
            if self.config.policy.strip_leading_wildcards {
                text = strip_leading_wildcards(&text);
                if text.is_empty() {
                    if self.config.policy.reject_all_wildcard_terms {
                        return Err(CallunaError::InvalidWildCard);
                    }
                    return Ok(None);
                }
                if !has_unescaped_wildcard(&text) {
                    parsed.wildcard = false;
                }
            }
        }

        if text.is_empty() {
            return Ok(None);
        }
        parsed.term = text;
        Ok(Some(parsed))
    }
}

impl Default for QueryParser {
    fn default() -> Self {
        QueryParser::new(ParserConfig::default())
    }
}

/// Append a term, coalescing duplicates inside OR/IOR/AND clusters.
fn push_term(cluster: &mut TermCluster, parsed: ParsedTerm) {
    let coalesce = matches!(
        cluster.operator,
        Operator::Or | Operator::Ior | Operator::And
    );
    if coalesce {
        let duplicate = cluster
            .children
            .iter()
            .any(|child| matches!(child, Child::Term(existing) if *existing == parsed));
        if duplicate {
            return;
        }
    }
    cluster.children.push(Child::Term(parsed));
}

/// Collapse a cluster whose only child is another cluster.
fn collapse(mut cluster: TermCluster) -> TermCluster {
    if cluster.children.len() == 1 {
        if let Child::Cluster(_) = cluster.children[0] {
            if let Child::Cluster(inner) = cluster.children.remove(0) {
                return collapse(inner);
            }
        }
    }
    cluster
}

// -- Stage 1 --

/// Clean the raw search string: normalize unsafe characters and isolate
/// delimiter characters with spaces. Backslash escapes the following
/// character.
fn clean(text: &str) -> String {
    let mut normalized: String = text
        .chars()
        .map(|c| {
            if c.is_control() || c == '\u{3000}' {
                ' '
            } else {
                c
            }
        })
        .collect();

    while normalized.contains("\"\"") {
        normalized = normalized.replace("\"\"", "\"");
    }
    normalized = normalized.replace("\\\"", "\"");
    while normalized.contains("**") {
        normalized = normalized.replace("**", "*");
    }

    let mut out = String::with_capacity(normalized.len() + 8);
    let mut chars = normalized.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                out.push('\\');
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            '"' | '(' | ')' | '{' | '}' => {
                out.push(' ');
                out.push(c);
                out.push(' ');
            }
            _ => out.push(c),
        }
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

// -- Stage 2 --

fn check_balance(tokens: &mut Vec<String>, policy: &ParserPolicy) -> Result<()> {
    // Quotes are standalone tokens after cleaning.
    let quote_count = tokens.iter().filter(|t| *t == "\"").count();
    if quote_count % 2 == 1 {
        if policy.reject_unbalanced_quotes {
            return Err(CallunaError::InvalidQuote);
        }
        tokens.push("\"".to_string());
    }

    // Parentheses: drop unmatched closers, append missing closers.
    let mut depth = 0i32;
    let mut repaired = Vec::with_capacity(tokens.len());
    for token in tokens.drain(..) {
        if token == "(" {
            depth += 1;
        } else if token == ")" {
            if depth == 0 {
                if policy.reject_unbalanced_parens {
                    return Err(CallunaError::InvalidSyntax);
                }
                continue;
            }
            depth -= 1;
        }
        repaired.push(token);
    }
    if depth > 0 && policy.reject_unbalanced_parens {
        return Err(CallunaError::InvalidSyntax);
    }
    for _ in 0..depth {
        repaired.push(")".to_string());
    }
    *tokens = repaired;

    // Square brackets: counted over unescaped characters; the literal
    // merge in stage 4 repairs a missing closer.
    let mut opens = 0usize;
    let mut closes = 0usize;
    for token in tokens.iter() {
        let mut chars = token.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    chars.next();
                }
                '[' => opens += 1,
                ']' => closes += 1,
                _ => {}
            }
        }
    }
    if opens != closes && policy.reject_unbalanced_brackets {
        return Err(CallunaError::InvalidBracket);
    }

    Ok(())
}

// -- Stage 4 helpers --

/// Merge a multi-token `[a b]` literal into a single token, repairing a
/// missing closing bracket at end of stream.
fn merge_bracket_literals(tokens: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut iter = tokens.into_iter();

    while let Some(token) = iter.next() {
        if token.starts_with('[') && !token.ends_with(']') {
            let mut merged = token;
            for next in iter.by_ref() {
                merged.push(' ');
                merged.push_str(&next);
                if merged.ends_with(']') {
                    break;
                }
            }
            if !merged.ends_with(']') {
                merged.push(']');
            }
            out.push(merged);
        } else {
            out.push(token);
        }
    }

    out
}

/// Canonical uppercase operator spelling for a token, or `None` when the
/// token is not an operator under the given case mode. A distance
/// bracket is preserved: `near[5]` becomes `NEAR[5]`.
fn canonical_operator_token(token: &str, case: OperatorCase) -> Option<String> {
    // ASCII aliases are case-insensitive by nature.
    match token {
        "|" | "||" => return Some("OR".to_string()),
        "&" | "&&" | "+" => return Some("AND".to_string()),
        "-" | "^" => return Some("NOT".to_string()),
        _ => {}
    }

    let (name, bracket) = match token.find('[') {
        Some(open) if token.ends_with(']') => (&token[..open], &token[open..]),
        _ => (token, ""),
    };

    let operator = Operator::from_name(&name.to_lowercase())?;
    let case_ok = match case {
        OperatorCase::Any => true,
        OperatorCase::Upper => name.chars().all(|c| !c.is_lowercase()),
        OperatorCase::Lower => name.chars().all(|c| !c.is_uppercase()),
    };
    if !case_ok {
        return None;
    }

    // Only ADJ and NEAR carry a distance bracket.
    if !bracket.is_empty() && !matches!(operator, Operator::Adj | Operator::Near) {
        return None;
    }

    Some(format!("{}{}", operator.as_str(), bracket))
}

/// Lowercase a term token, preserving the original spelling inside
/// `literal[...]` and `regex[...]` envelopes and inside a bare `[...]`
/// bracket (which rewrites to a literal).
fn lowercase_term_token(token: &str) -> String {
    if token.starts_with('[') {
        return token.to_string();
    }
    if let Some(open) = token.find('[') {
        if open > 0 && token.ends_with(']') {
            let name = token[..open].to_lowercase();
            if matches!(name.as_str(), "literal" | "regex" | "regexp") {
                return format!("{name}{}", &token[open..]);
            }
        }
    }
    token.to_lowercase()
}

/// Rewrite `[x]` into `literal[x]` and `-x` into `not x`.
fn rewrite_tokens(tokens: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(tokens.len());
    for token in tokens {
        if token.starts_with('[') && token.ends_with(']') && token.len() > 2 {
            out.push(format!("literal{token}"));
            continue;
        }
        if let Some(rest) = token.strip_prefix('-') {
            if !rest.is_empty()
                && canonical_operator_token(rest, OperatorCase::Any).is_none()
            {
                out.push("NOT".to_string());
                out.push(rest.to_string());
                continue;
            }
        }
        out.push(token);
    }
    out
}

/// Expand multi-character tokens in undelimited scripts: a bare token
/// becomes an adjacency group, a quoted token flattens into its
/// characters so the surrounding phrase stays a phrase.
fn expand_undelimited(tokens: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut in_quotes = false;

    for token in tokens {
        if token == "\"" {
            in_quotes = !in_quotes;
            out.push(token);
            continue;
        }
        let characters: Vec<char> = token.chars().collect();
        if characters.len() > 1 && characters.iter().all(|&c| is_undelimited_char(c)) {
            if in_quotes {
                for c in characters {
                    out.push(c.to_string());
                }
            } else {
                out.push("(".to_string());
                for (i, c) in characters.iter().enumerate() {
                    if i > 0 {
                        out.push("ADJ".to_string());
                    }
                    out.push(c.to_string());
                }
                out.push(")".to_string());
            }
        } else {
            out.push(token);
        }
    }

    out
}

/// Convert quoted phrases into explicit adjacency groups.
fn convert_phrases(tokens: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut iter = tokens.into_iter();

    while let Some(token) = iter.next() {
        if token != "\"" {
            out.push(token);
            continue;
        }
        let mut phrase = Vec::new();
        for inner in iter.by_ref() {
            if inner == "\"" {
                break;
            }
            phrase.push(inner);
        }
        match phrase.len() {
            0 => {}
            1 => out.push(phrase.pop().unwrap()),
            _ => {
                out.push("(".to_string());
                for (i, word) in phrase.into_iter().enumerate() {
                    if i > 0 {
                        out.push("ADJ".to_string());
                    }
                    out.push(word);
                }
                out.push(")".to_string());
            }
        }
    }

    out
}

/// Distribute a field prefix across a parenthesized group:
/// `field=(a b)` becomes `(field=a field=b)`.
fn distribute_field_groups(tokens: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut iter = tokens.into_iter().peekable();

    while let Some(token) = iter.next() {
        let is_prefix = match find_range_op(&token) {
            Some((at, _, length)) => at > 0 && at + length == token.len(),
            None => false,
        };
        if !is_prefix || iter.peek().map(String::as_str) != Some("(") {
            out.push(token);
            continue;
        }

        out.push(iter.next().unwrap()); // the "("
        let mut depth = 1;
        for inner in iter.by_ref() {
            if inner == "(" {
                depth += 1;
                out.push(inner);
                continue;
            }
            if inner == ")" {
                depth -= 1;
                out.push(inner);
                if depth == 0 {
                    break;
                }
                continue;
            }
            let is_term = canonical_operator_token(&inner, OperatorCase::Any).is_none()
                && find_range_op(&inner).is_none();
            if is_term {
                out.push(format!("{token}{inner}"));
            } else {
                out.push(inner);
            }
        }
    }

    out
}

lazy_static! {
    /// Fixed replacement list correcting common misgroupings. Applied to
    /// the space-joined token stream after operator canonicalization.
    static ref REPLACEMENTS: AhoCorasick = AhoCorasick::new([
        " ( NOT ",
        " ( AND ",
        " ( OR ",
        " AND ) ",
        " OR ) ",
        " NOT ) ",
    ])
    .expect("replacement patterns are valid");
}

const REPLACEMENT_TARGETS: &[&str] = &[" NOT ( ", " ( ", " ( ", " ) ", " ) ", " ) "];

fn apply_replacements(tokens: Vec<String>) -> Vec<String> {
    let joined = format!(" {} ", tokens.join(" "));
    let replaced = REPLACEMENTS.replace_all(&joined, REPLACEMENT_TARGETS);
    replaced.split_whitespace().map(str::to_string).collect()
}

/// Insert the default boolean operator between adjacent terms/groups.
fn insert_default_operator(tokens: Vec<String>, default_operator: Operator) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tokens.len() * 2);

    for token in tokens {
        let starts_operand = token == "(" || !is_syntax_token(&token);
        if starts_operand {
            if let Some(previous) = out.last() {
                let ends_operand = previous == ")" || !is_syntax_token(previous);
                if ends_operand {
                    out.push(default_operator.as_str().to_string());
                }
            }
        }
        out.push(token);
    }

    out
}

/// True for tokens that are parser syntax rather than terms: parens and
/// canonical operators.
fn is_syntax_token(token: &str) -> bool {
    token == "(" || token == ")" || parse_operator_token(token).ok().flatten().is_some()
}

/// Parse a canonical operator token, returning the operator and, for
/// ADJ/NEAR, any distance with its order-matters flag.
#[allow(clippy::type_complexity)]
fn parse_operator_token(token: &str) -> Result<Option<(Operator, Option<(i32, bool)>)>> {
    let (name, bracket) = match token.find('[') {
        Some(open) if token.ends_with(']') => (&token[..open], Some(&token[open + 1..token.len() - 1])),
        _ => (token, None),
    };

    let operator = match name {
        "OR" => Operator::Or,
        "IOR" => Operator::Ior,
        "XOR" => Operator::Xor,
        "AND" => Operator::And,
        "ADJ" => Operator::Adj,
        "NEAR" => Operator::Near,
        "NOT" => Operator::Not,
        _ => return Ok(None),
    };

    let distance = match bracket {
        Some(text) => {
            if !matches!(operator, Operator::Adj | Operator::Near) {
                return Ok(None);
            }
            let order_matters = text.starts_with('+') || text.starts_with('-');
            let value: i32 = text
                .parse()
                .map_err(|_| CallunaError::InvalidOperatorDistance)?;
            Some((value, order_matters))
        }
        None => None,
    };

    Ok(Some((operator, distance)))
}

/// Find the earliest unescaped range operator in a token, returning its
/// byte position, the operator, and the operator's length.
fn find_range_op(text: &str) -> Option<(usize, RangeOp, usize)> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            i += 2;
            continue;
        }
        if let Some((range, length)) = RangeOp::parse_prefix(&text[i..]) {
            return Some((i, range, length));
        }
        i += 1;
    }
    None
}

fn strip_leading_wildcards(text: &str) -> String {
    let mut chars = text.chars().peekable();
    while let Some(&c) = chars.peek() {
        if WILDCARD_CHARS.contains(&c) {
            chars.next();
        } else {
            break;
        }
    }
    chars.collect()
}

/// Join tokens into display text, tightening parentheses.
fn detokenize(tokens: &[String]) -> String {
    let mut out = String::new();
    for token in tokens {
        let after_open = out.ends_with('(');
        if !out.is_empty() && !after_open && token != ")" {
            out.push(' ');
        }
        if token == ")" {
            out.push(')');
        } else {
            out.push_str(token);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::modifiers::{Sort, SortOrder};

    fn parse(text: &str) -> QueryParser {
        let mut parser = QueryParser::default();
        parser
            .parse_at(text, NaiveDate::from_ymd_opt(2020, 6, 17).unwrap())
            .unwrap();
        parser
    }

    fn parse_err(text: &str) -> CallunaError {
        let mut parser = QueryParser::default();
        parser
            .parse_at(text, NaiveDate::from_ymd_opt(2020, 6, 17).unwrap())
            .unwrap_err()
    }

    fn term(child: &Child) -> &ParsedTerm {
        match child {
            Child::Term(t) => t,
            Child::Cluster(_) => panic!("expected a term child"),
        }
    }

    #[test]
    fn test_default_and_between_terms() {
        let parser = parse("cat dog");
        assert_eq!(parser.normalized_search_text(), "cat AND dog");

        let cluster = parser.term_cluster().unwrap();
        assert_eq!(cluster.operator, Operator::And);
        assert_eq!(cluster.children.len(), 2);

        let cat = term(&cluster.children[0]);
        assert_eq!(cat.term, "cat");
        assert_eq!(cat.range, RangeOp::Equal);
        assert!(cat.field_name.is_none());
        assert!(cat.function.is_none());
        assert_eq!(cat.weight, 0.0);
        assert!(!cat.required);
        assert_eq!(term(&cluster.children[1]).term, "dog");
    }

    #[test]
    fn test_field_distributed_group() {
        let parser = parse("title=(quick brown fox)");
        assert_eq!(
            parser.normalized_search_text(),
            "(title=quick AND title=brown AND title=fox)"
        );

        let cluster = parser.term_cluster().unwrap();
        assert_eq!(cluster.operator, Operator::And);
        assert_eq!(cluster.children.len(), 3);
        for child in &cluster.children {
            let t = term(child);
            assert_eq!(t.field_name.as_deref(), Some("title"));
            assert_eq!(t.range, RangeOp::Equal);
        }
    }

    #[test]
    fn test_bare_not_rejected() {
        assert!(matches!(
            parse_err("not cat"),
            CallunaError::InvalidNotOperator
        ));
    }

    #[test]
    fn test_phrase_to_adjacency() {
        let parser = parse("\"new york city\"");
        assert_eq!(parser.normalized_search_text(), "(new ADJ york ADJ city)");

        let cluster = parser.term_cluster().unwrap();
        assert_eq!(cluster.operator, Operator::Adj);
        assert_eq!(cluster.distance, 0);
        assert_eq!(cluster.children.len(), 3);
    }

    #[test]
    fn test_modifier_extraction() {
        let parser =
            parse("foo {boolean_operator:or} {date>=20200101,<20210101} {sort:date:desc}");

        let cluster = parser.term_cluster().unwrap();
        assert_eq!(cluster.children.len(), 1);
        assert_eq!(term(&cluster.children[0]).term, "foo");

        let modifiers = parser.modifiers();
        assert_eq!(modifiers.boolean_operator, Operator::Or);
        assert_eq!(modifiers.dates.len(), 2);
        assert_eq!(modifiers.dates[0].number, 20200101000000);
        assert_eq!(modifiers.dates[0].range, RangeOp::GreaterOrEqual);
        assert_eq!(modifiers.dates[1].number, 20210101000000);
        assert_eq!(modifiers.dates[1].range, RangeOp::Less);
        assert_eq!(
            modifiers.sort,
            Sort::Field {
                name: "date".to_string(),
                order: SortOrder::Desc
            }
        );

        let full = parser.full_normalized_search_text();
        assert!(full.starts_with("foo"));
        assert!(full.contains("{boolean_operator:or}"));
        assert!(full.contains("{date>=20200101000000,<20210101000000}"));
        assert!(full.contains("{sort:date:desc}"));
    }

    #[test]
    fn test_operators_and_aliases() {
        let parser = parse("cat | dog");
        assert_eq!(parser.normalized_search_text(), "cat OR dog");
        assert_eq!(parser.term_cluster().unwrap().operator, Operator::Or);

        let parser = parse("cat && dog");
        assert_eq!(parser.term_cluster().unwrap().operator, Operator::And);

        let parser = parse("cat or dog");
        assert_eq!(parser.term_cluster().unwrap().operator, Operator::Or);
    }

    #[test]
    fn test_near_distances() {
        let parser = parse("cat near[5] dog");
        let cluster = parser.term_cluster().unwrap();
        assert_eq!(cluster.operator, Operator::Near);
        assert_eq!(cluster.distance, 5);
        assert!(!cluster.order_matters);

        let parser = parse("cat near[+3] dog");
        let cluster = parser.term_cluster().unwrap();
        assert_eq!(cluster.distance, 3);
        assert!(cluster.order_matters);

        let parser = parse("cat near[-2] dog");
        let cluster = parser.term_cluster().unwrap();
        assert_eq!(cluster.distance, -2);
        assert!(cluster.order_matters);

        let parser = parse("cat near[0] dog");
        assert_eq!(parser.term_cluster().unwrap().distance, 0);

        assert!(matches!(
            parse_err("cat near[xx] dog"),
            CallunaError::InvalidOperatorDistance
        ));
    }

    #[test]
    fn test_term_suffixes() {
        let parser = parse("+title=cat[2.5]");
        let cluster = parser.term_cluster().unwrap();
        let t = term(&cluster.children[0]);
        assert!(t.required);
        assert_eq!(t.field_name.as_deref(), Some("title"));
        assert_eq!(t.term, "cat");
        assert_eq!(t.weight, 2.5);
    }

    #[test]
    fn test_functions() {
        let parser = parse("soundslike[smith]");
        let t = term(&parser.term_cluster().unwrap().children[0]);
        assert_eq!(t.function, Some(FunctionId::Metaphone));
        assert_eq!(t.term, "smith");

        // Literal keeps the original spelling.
        let parser = parse("literal[MiXeD]");
        let t = term(&parser.term_cluster().unwrap().children[0]);
        assert_eq!(t.function, Some(FunctionId::Literal));
        assert_eq!(t.term, "MiXeD");

        // Regex keeps spelling and is not a wildcard term.
        let parser = parse("regex[ab.*c]");
        let t = term(&parser.term_cluster().unwrap().children[0]);
        assert_eq!(t.function, Some(FunctionId::Regex));
        assert_eq!(t.term, "ab.*c");
        assert!(!t.wildcard);
    }

    #[test]
    fn test_bracket_literal_rewrite() {
        let parser = parse("[MiXeD]");
        let t = term(&parser.term_cluster().unwrap().children[0]);
        assert_eq!(t.function, Some(FunctionId::Literal));
        assert_eq!(t.term, "MiXeD");
    }

    #[test]
    fn test_dash_rewrite() {
        let parser = parse("cat -dog");
        let cluster = parser.term_cluster().unwrap();
        assert_eq!(cluster.operator, Operator::Not);
        assert_eq!(cluster.children.len(), 2);
    }

    #[test]
    fn test_wildcards() {
        let parser = parse("fo*");
        let t = term(&parser.term_cluster().unwrap().children[0]);
        assert!(t.wildcard);

        // Escaped wildcard is not a wildcard.
        let parser = parse(r"fo\*");
        let t = term(&parser.term_cluster().unwrap().children[0]);
        assert!(!t.wildcard);

        // Leading wildcards are stripped.
        let parser = parse("*cat");
        let t = term(&parser.term_cluster().unwrap().children[0]);
        assert_eq!(t.term, "cat");
        assert!(!t.wildcard);

        // A term that is nothing but wildcards is dropped.
        let parser = parse("*? cat");
        let cluster = parser.term_cluster().unwrap();
        assert_eq!(cluster.children.len(), 1);
        assert_eq!(term(&cluster.children[0]).term, "cat");
    }

    #[test]
    fn test_case_dropped_by_default() {
        let parser = parse("CAT Dog");
        assert_eq!(parser.normalized_search_text(), "cat AND dog");
    }

    #[test]
    fn test_operator_case_upper() {
        let mut config = ParserConfig::default();
        config.defaults.operator_case = OperatorCase::Upper;
        let mut parser = QueryParser::new(config);

        // Lowercase "and" is a term, not an operator.
        parser
            .parse_at("cat and dog", NaiveDate::from_ymd_opt(2020, 6, 17).unwrap())
            .unwrap();
        assert_eq!(parser.normalized_search_text(), "cat AND and AND dog");

        parser
            .parse_at("cat AND dog", NaiveDate::from_ymd_opt(2020, 6, 17).unwrap())
            .unwrap();
        assert_eq!(parser.normalized_search_text(), "cat AND dog");
    }

    #[test]
    fn test_duplicate_terms_coalesce() {
        let parser = parse("cat or cat or dog");
        let cluster = parser.term_cluster().unwrap();
        assert_eq!(cluster.children.len(), 2);
    }

    #[test]
    fn test_unbalanced_parens_repaired() {
        let parser = parse("(cat dog");
        assert_eq!(parser.normalized_search_text(), "(cat AND dog)");

        let parser = parse("cat dog)");
        assert_eq!(parser.normalized_search_text(), "cat AND dog");
    }

    #[test]
    fn test_unbalanced_quote_repaired() {
        let parser = parse("\"new york");
        assert_eq!(parser.normalized_search_text(), "(new ADJ york)");
    }

    #[test]
    fn test_misgrouped_not_replacement() {
        let parser = parse("cat ( not dog )");
        let cluster = parser.term_cluster().unwrap();
        assert_eq!(cluster.operator, Operator::Not);
        assert_eq!(cluster.children.len(), 2);
    }

    #[test]
    fn test_empty_query() {
        let parser = parse("");
        assert!(parser.term_cluster().is_none());
        assert_eq!(parser.normalized_search_text(), "");
        assert_eq!(parser.search_term_count(), 0);
    }

    #[test]
    fn test_modifiers_only_query() {
        let parser = parse("{boolean_operator:near}");
        assert!(parser.term_cluster().is_none());
        assert_eq!(parser.modifiers().boolean_operator, Operator::Near);
        assert_eq!(
            parser.full_normalized_search_text(),
            "{boolean_operator:near}"
        );
    }

    #[test]
    fn test_cjk_expansion() {
        let parser = parse("東京");
        assert_eq!(parser.normalized_search_text(), "(東 ADJ 京)");

        let parser = parse("\"東京 大阪\"");
        // The quoted form stays one phrase of characters.
        assert_eq!(
            parser.normalized_search_text(),
            "(東 ADJ 京 ADJ 大 ADJ 阪)"
        );
    }

    #[test]
    fn test_freetext_inserts_no_operators() {
        let parser = parse("{search_type:freetext} cat dog bird");
        assert_eq!(parser.normalized_search_text(), "cat dog bird");
        let cluster = parser.term_cluster().unwrap();
        assert_eq!(cluster.operator, Operator::Or);
        assert_eq!(cluster.children.len(), 3);
    }

    #[test]
    fn test_search_term_count() {
        let parser = parse("cat dog (fish or bird)");
        assert_eq!(parser.search_term_count(), 4);
    }

    #[test]
    fn test_parser_idempotence() {
        let first = parse("title=(quick brown) \"new york\" -cat");
        let normalized = first.normalized_search_text().to_string();

        let second = parse(&normalized);
        assert_eq!(second.normalized_search_text(), normalized);
        assert_eq!(second.term_cluster(), first.term_cluster());
    }

    #[test]
    fn test_reset_keeps_defaults() {
        let mut config = ParserConfig::default();
        config.defaults.boolean_operator = Operator::Or;
        let mut parser = QueryParser::new(config);

        parser
            .parse_at(
                "cat {boolean_operator:near}",
                NaiveDate::from_ymd_opt(2020, 6, 17).unwrap(),
            )
            .unwrap();
        assert_eq!(parser.modifiers().boolean_operator, Operator::Near);

        parser.reset();
        assert!(parser.term_cluster().is_none());
        assert_eq!(parser.modifiers().boolean_operator, Operator::Or);
    }

    #[test]
    fn test_error_resets_parser() {
        let mut parser = QueryParser::default();
        let result = parser.parse_at("not cat", NaiveDate::from_ymd_opt(2020, 6, 17).unwrap());
        assert!(result.is_err());
        assert!(parser.term_cluster().is_none());
        assert_eq!(parser.normalized_search_text(), "");
    }
}
