//! Parsed query tree: terms, clusters, operators, and parser value types.

/// Range operators recognized in fielded searches. `:` parses as a
/// synonym of `=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RangeOp {
    #[default]
    Equal,
    NotEqual,
    Less,
    Greater,
    LessOrEqual,
    GreaterOrEqual,
}

impl RangeOp {
    /// Parse a range operator at the start of `text`, returning the
    /// operator and its length in bytes.
    pub fn parse_prefix(text: &str) -> Option<(RangeOp, usize)> {
        if text.starts_with("!=") {
            Some((RangeOp::NotEqual, 2))
        } else if text.starts_with("<=") {
            Some((RangeOp::LessOrEqual, 2))
        } else if text.starts_with(">=") {
            Some((RangeOp::GreaterOrEqual, 2))
        } else if text.starts_with('<') {
            Some((RangeOp::Less, 1))
        } else if text.starts_with('>') {
            Some((RangeOp::Greater, 1))
        } else if text.starts_with('=') || text.starts_with(':') {
            Some((RangeOp::Equal, 1))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RangeOp::Equal => "=",
            RangeOp::NotEqual => "!=",
            RangeOp::Less => "<",
            RangeOp::Greater => ">",
            RangeOp::LessOrEqual => "<=",
            RangeOp::GreaterOrEqual => ">=",
        }
    }
}

/// Boolean operators carried by a [`TermCluster`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Or,
    Ior,
    Xor,
    And,
    Adj,
    Near,
    Not,
}

impl Operator {
    /// The canonical spelling used in normalized search text.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Or => "OR",
            Operator::Ior => "IOR",
            Operator::Xor => "XOR",
            Operator::And => "AND",
            Operator::Adj => "ADJ",
            Operator::Near => "NEAR",
            Operator::Not => "NOT",
        }
    }

    /// Parse an operator name (no aliases, no distance bracket).
    pub fn from_name(name: &str) -> Option<Operator> {
        match name {
            "or" => Some(Operator::Or),
            "ior" => Some(Operator::Ior),
            "xor" => Some(Operator::Xor),
            "and" => Some(Operator::And),
            "adj" => Some(Operator::Adj),
            "near" => Some(Operator::Near),
            "not" => Some(Operator::Not),
            _ => None,
        }
    }
}

/// Term functions. `soundslike` is an alias of metaphone, `regexp` of
/// regex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionId {
    Metaphone,
    Soundex,
    Phonix,
    Typo,
    Regex,
    Literal,
    Range,
}

impl FunctionId {
    pub fn from_name(name: &str) -> Option<FunctionId> {
        match name {
            "metaphone" | "soundslike" => Some(FunctionId::Metaphone),
            "soundex" => Some(FunctionId::Soundex),
            "phonix" => Some(FunctionId::Phonix),
            "typo" => Some(FunctionId::Typo),
            "regex" | "regexp" => Some(FunctionId::Regex),
            "literal" => Some(FunctionId::Literal),
            "range" => Some(FunctionId::Range),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionId::Metaphone => "metaphone",
            FunctionId::Soundex => "soundex",
            FunctionId::Phonix => "phonix",
            FunctionId::Typo => "typo",
            FunctionId::Regex => "regex",
            FunctionId::Literal => "literal",
            FunctionId::Range => "range",
        }
    }
}

/// The wildcard metacharacters, unless backslash-escaped: `*` any run,
/// `?` one character, `@` one alphabetic, `%` one digit.
pub const WILDCARD_CHARS: &[char] = &['*', '?', '@', '%'];

/// True if `text` contains an unescaped wildcard metacharacter.
pub fn has_unescaped_wildcard(text: &str) -> bool {
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            chars.next();
        } else if WILDCARD_CHARS.contains(&c) {
            return true;
        }
    }
    false
}

/// A single parsed search term.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedTerm {
    pub term: String,
    pub field_name: Option<String>,
    pub function: Option<FunctionId>,
    pub range: RangeOp,
    pub wildcard: bool,
    /// Zero means the default weight.
    pub weight: f32,
    /// Set by a leading `+`.
    pub required: bool,
}

/// A child of a cluster: a term or a nested cluster.
#[derive(Debug, Clone, PartialEq)]
pub enum Child {
    Term(ParsedTerm),
    Cluster(TermCluster),
}

/// An internal node of the parsed query tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TermCluster {
    pub operator: Operator,
    /// Term distance for ADJ/NEAR; zero means any.
    pub distance: i32,
    /// True when an explicit sign on the distance made order matter.
    pub order_matters: bool,
    pub children: Vec<Child>,
}

impl TermCluster {
    pub fn new(operator: Operator) -> Self {
        TermCluster {
            operator,
            distance: 0,
            order_matters: false,
            children: Vec::new(),
        }
    }

    /// Total number of terms under this cluster.
    pub fn term_count(&self) -> u32 {
        self.children
            .iter()
            .map(|child| match child {
                Child::Term(_) => 1,
                Child::Cluster(cluster) => cluster.term_count(),
            })
            .sum()
    }
}

/// A numeric restriction (date or language) with its range operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserNumber {
    pub number: u64,
    pub range: RangeOp,
}

/// Filter kind for inclusion/exclusion filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    /// A comma-separated list of `[field=]term` entries.
    Terms,
    /// The name of a stored filter list.
    List,
}

/// One inclusion or exclusion filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserFilter {
    pub filter: String,
    pub kind: FilterKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_op_prefix() {
        assert_eq!(RangeOp::parse_prefix(">=2020"), Some((RangeOp::GreaterOrEqual, 2)));
        assert_eq!(RangeOp::parse_prefix("!=x"), Some((RangeOp::NotEqual, 2)));
        assert_eq!(RangeOp::parse_prefix(":x"), Some((RangeOp::Equal, 1)));
        assert_eq!(RangeOp::parse_prefix("<x"), Some((RangeOp::Less, 1)));
        assert_eq!(RangeOp::parse_prefix("x"), None);
    }

    #[test]
    fn test_wildcard_detection() {
        assert!(has_unescaped_wildcard("fo*"));
        assert!(has_unescaped_wildcard("f?x"));
        assert!(has_unescaped_wildcard("a@b"));
        assert!(has_unescaped_wildcard("50%"));
        assert!(!has_unescaped_wildcard(r"fo\*"));
        assert!(!has_unescaped_wildcard("plain"));
    }

    #[test]
    fn test_function_aliases() {
        assert_eq!(FunctionId::from_name("soundslike"), Some(FunctionId::Metaphone));
        assert_eq!(FunctionId::from_name("regexp"), Some(FunctionId::Regex));
        assert_eq!(FunctionId::from_name("nope"), None);
    }

    #[test]
    fn test_term_count() {
        let mut inner = TermCluster::new(Operator::Adj);
        inner.children.push(Child::Term(ParsedTerm::default()));
        inner.children.push(Child::Term(ParsedTerm::default()));

        let mut root = TermCluster::new(Operator::And);
        root.children.push(Child::Term(ParsedTerm::default()));
        root.children.push(Child::Cluster(inner));
        assert_eq!(root.term_count(), 3);
    }
}
