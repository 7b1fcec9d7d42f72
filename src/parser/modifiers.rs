//! Brace-wrapped search modifiers.
//!
//! A modifier token is `{name:value}` (dates also accept a range
//! operator straight after the name, `{date>=20200101}`). Long and
//! abbreviated names share one table scanned in declaration order, so a
//! colliding abbreviation resolves to the earliest entry — `sr` is
//! search_results, `bo` is boolean_operator, `d` is debug, `st` is
//! search_type; the shadowed modifiers are reachable by full name only.

use chrono::NaiveDate;

use crate::error::{CallunaError, Result};
use crate::language;
use crate::parser::dates::normalize_date_value;
use crate::parser::term::{FilterKind, Operator, ParserFilter, ParserNumber, RangeOp};

/// Return or suppress a response section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnSuppress {
    #[default]
    Return,
    Suppress,
}

/// Boolean operation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BooleanOperation {
    #[default]
    Relaxed,
    Strict,
}

/// Operator case sensitivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperatorCase {
    #[default]
    Any,
    Upper,
    Lower,
}

/// Term case handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TermCase {
    Keep,
    #[default]
    Drop,
}

/// Frequent terms policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrequentTerms {
    #[default]
    Keep,
    Drop,
}

/// Search type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchType {
    #[default]
    Boolean,
    Freetext,
}

/// Sort order for an explicit sort field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Result sorting requested by the search.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Sort {
    #[default]
    Default,
    None,
    Field {
        name: String,
        order: SortOrder,
    },
}

/// Every modifier a search can carry, with defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Modifiers {
    pub search_results: ReturnSuppress,
    pub search_report: ReturnSuppress,
    pub search_cache_enabled: bool,
    pub debug_enabled: bool,
    pub early_completion_enabled: bool,
    pub boolean_operator: Operator,
    pub boolean_operation: BooleanOperation,
    pub operator_case: OperatorCase,
    pub term_case: TermCase,
    pub frequent_terms: FrequentTerms,
    pub search_type: SearchType,
    pub sort: Sort,
    pub dates: Vec<ParserNumber>,
    pub unfielded_search_field_names: Vec<String>,
    pub term_weight: f32,
    pub feedback_term_weight: f32,
    pub frequent_term_coverage_threshold: f32,
    pub feedback_minimum_term_count: u32,
    pub feedback_maximum_term_percentage: f32,
    pub feedback_maximum_term_coverage_threshold: f32,
    pub connection_timeout: u32,
    pub search_timeout: u32,
    pub retrieval_timeout: u32,
    pub information_timeout: u32,
    pub segments_searched_maximum: u32,
    pub segments_searched_minimum: u32,
    pub exclusion_filters: Vec<ParserFilter>,
    pub inclusion_filters: Vec<ParserFilter>,
    /// Language restrictions as language IDs.
    pub languages: Vec<ParserNumber>,
    pub tag: Option<String>,
}

impl Default for Modifiers {
    fn default() -> Self {
        Modifiers {
            search_results: ReturnSuppress::Return,
            search_report: ReturnSuppress::Return,
            search_cache_enabled: true,
            debug_enabled: false,
            early_completion_enabled: false,
            boolean_operator: Operator::And,
            boolean_operation: BooleanOperation::Relaxed,
            operator_case: OperatorCase::Any,
            term_case: TermCase::Drop,
            frequent_terms: FrequentTerms::Keep,
            search_type: SearchType::Boolean,
            sort: Sort::Default,
            dates: Vec::new(),
            unfielded_search_field_names: Vec::new(),
            term_weight: 0.0,
            feedback_term_weight: 0.0,
            frequent_term_coverage_threshold: 0.0,
            feedback_minimum_term_count: 0,
            feedback_maximum_term_percentage: 0.0,
            feedback_maximum_term_coverage_threshold: 0.0,
            connection_timeout: 0,
            search_timeout: 0,
            retrieval_timeout: 0,
            information_timeout: 0,
            segments_searched_maximum: 0,
            segments_searched_minimum: 0,
            exclusion_filters: Vec::new(),
            inclusion_filters: Vec::new(),
            languages: Vec::new(),
            tag: None,
        }
    }
}

/// The modifier table entries, in resolution order. Collisions between
/// abbreviations resolve to the earliest entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModifierId {
    SearchResults,
    SearchReport,
    SearchCache,
    Debug,
    BooleanOperator,
    BooleanOperation,
    OperatorCase,
    TermCase,
    FrequentTerms,
    SearchType,
    Date,
    UnfieldedSearchFieldNames,
    Sort,
    EarlyCompletion,
    TermWeight,
    FeedbackTermWeight,
    FrequentTermCoverageThreshold,
    FeedbackMinimumTermCount,
    FeedbackMaximumTermPercentage,
    FeedbackMaximumTermCoverageThreshold,
    ConnectionTimeout,
    SearchTimeout,
    RetrievalTimeout,
    InformationTimeout,
    SegmentsSearchedMaximum,
    SegmentsSearchedMinimum,
    ExclusionFilter,
    InclusionFilter,
    ExclusionListFilter,
    InclusionListFilter,
    Language,
    Tag,
}

/// `(long name, abbreviated name, id)` in resolution order.
const MODIFIER_TABLE: &[(&str, &str, ModifierId)] = &[
    ("search_results", "sr", ModifierId::SearchResults),
    ("search_report", "sr", ModifierId::SearchReport),
    ("search_cache", "sc", ModifierId::SearchCache),
    ("debug", "d", ModifierId::Debug),
    ("boolean_operator", "bo", ModifierId::BooleanOperator),
    ("boolean_operation", "bo", ModifierId::BooleanOperation),
    ("operator_case", "oc", ModifierId::OperatorCase),
    ("term_case", "tc", ModifierId::TermCase),
    ("frequent_terms", "ft", ModifierId::FrequentTerms),
    ("search_type", "st", ModifierId::SearchType),
    ("date", "d", ModifierId::Date),
    (
        "unfielded_search_field_names",
        "usfn",
        ModifierId::UnfieldedSearchFieldNames,
    ),
    ("sort", "s", ModifierId::Sort),
    ("early_completion", "ec", ModifierId::EarlyCompletion),
    ("term_weight", "tw", ModifierId::TermWeight),
    ("feedback_term_weight", "ftw", ModifierId::FeedbackTermWeight),
    (
        "frequent_term_coverage_threshold",
        "ftct",
        ModifierId::FrequentTermCoverageThreshold,
    ),
    (
        "feedback_minimum_term_count",
        "fmtc",
        ModifierId::FeedbackMinimumTermCount,
    ),
    (
        "feedback_maximum_term_percentage",
        "fmtp",
        ModifierId::FeedbackMaximumTermPercentage,
    ),
    (
        "feedback_maximum_term_coverage_threshold",
        "fmtct",
        ModifierId::FeedbackMaximumTermCoverageThreshold,
    ),
    ("connection_timeout", "ct", ModifierId::ConnectionTimeout),
    ("search_timeout", "st", ModifierId::SearchTimeout),
    ("retrieval_timeout", "rt", ModifierId::RetrievalTimeout),
    ("information_timeout", "it", ModifierId::InformationTimeout),
    (
        "segments_searched_maximum",
        "ssmx",
        ModifierId::SegmentsSearchedMaximum,
    ),
    (
        "segments_searched_minimum",
        "ssmn",
        ModifierId::SegmentsSearchedMinimum,
    ),
    ("exclusion_filter", "ef", ModifierId::ExclusionFilter),
    ("inclusion_filter", "if", ModifierId::InclusionFilter),
    ("exclusion_list_filter", "elf", ModifierId::ExclusionListFilter),
    ("inclusion_list_filter", "ilf", ModifierId::InclusionListFilter),
    ("language", "l", ModifierId::Language),
    ("tag", "t", ModifierId::Tag),
];

impl Modifiers {
    /// Apply one brace-token body (the text between `{` and `}`).
    ///
    /// `today` anchors natural-language date values.
    pub fn apply(&mut self, body: &str, today: NaiveDate) -> Result<()> {
        let body = body.trim();
        if body.is_empty() {
            return Err(CallunaError::InvalidModifier);
        }

        // The name is the leading run of letters and underscores.
        let name_end = body
            .find(|c: char| !c.is_ascii_alphabetic() && c != '_')
            .unwrap_or(body.len());
        let name = &body[..name_end].to_lowercase();
        let rest = &body[name_end..];

        let id = MODIFIER_TABLE
            .iter()
            .find(|(long, abbreviated, _)| long == name || abbreviated == name)
            .map(|(_, _, id)| *id)
            .ok_or(CallunaError::InvalidModifier)?;

        // Dates keep their range operator; everything else separates the
        // value with a colon.
        let value = match id {
            ModifierId::Date => rest,
            _ => rest.strip_prefix(':').unwrap_or(rest),
        };

        self.apply_value(id, value, today)
    }

    fn apply_value(&mut self, id: ModifierId, value: &str, today: NaiveDate) -> Result<()> {
        match id {
            ModifierId::SearchResults => {
                self.search_results = parse_return_suppress(value)?;
            }
            ModifierId::SearchReport => {
                self.search_report = parse_return_suppress(value)?;
            }
            ModifierId::SearchCache => {
                self.search_cache_enabled = parse_enable_disable(value)?;
            }
            ModifierId::Debug => {
                self.debug_enabled = parse_enable_disable(value)?;
            }
            ModifierId::EarlyCompletion => {
                self.early_completion_enabled = parse_enable_disable(value)?;
            }
            ModifierId::BooleanOperator => {
                self.boolean_operator = match value.to_lowercase().as_str() {
                    "or" => Operator::Or,
                    "ior" => Operator::Ior,
                    "xor" => Operator::Xor,
                    "and" => Operator::And,
                    "adj" => Operator::Adj,
                    "near" => Operator::Near,
                    _ => return Err(CallunaError::InvalidOperator),
                };
            }
            ModifierId::BooleanOperation => {
                self.boolean_operation = match value.to_lowercase().as_str() {
                    "relaxed" => BooleanOperation::Relaxed,
                    "strict" => BooleanOperation::Strict,
                    _ => return Err(CallunaError::InvalidModifier),
                };
            }
            ModifierId::OperatorCase => {
                self.operator_case = match value.to_lowercase().as_str() {
                    "any" => OperatorCase::Any,
                    "upper" => OperatorCase::Upper,
                    "lower" => OperatorCase::Lower,
                    _ => return Err(CallunaError::InvalidModifier),
                };
            }
            ModifierId::TermCase => {
                self.term_case = match value.to_lowercase().as_str() {
                    "keep" => TermCase::Keep,
                    "drop" => TermCase::Drop,
                    _ => return Err(CallunaError::InvalidModifier),
                };
            }
            ModifierId::FrequentTerms => {
                self.frequent_terms = match value.to_lowercase().as_str() {
                    "keep" => FrequentTerms::Keep,
                    "drop" => FrequentTerms::Drop,
                    _ => return Err(CallunaError::InvalidModifier),
                };
            }
            ModifierId::SearchType => {
                self.search_type = match value.to_lowercase().as_str() {
                    "boolean" => SearchType::Boolean,
                    "freetext" => SearchType::Freetext,
                    _ => return Err(CallunaError::InvalidModifier),
                };
            }
            ModifierId::Date => {
                // Multiple restrictions, comma-delimited, each carrying
                // its own range operator. Conflicting restrictions pass
                // through; combining them is the executor's business.
                for part in value.split(',') {
                    let part = part.trim();
                    if part.is_empty() {
                        return Err(CallunaError::InvalidDate);
                    }
                    let (range, consumed) =
                        RangeOp::parse_prefix(part).unwrap_or((RangeOp::Equal, 0));
                    let number = normalize_date_value(&part[consumed..], today)?;
                    self.dates.push(ParserNumber { number, range });
                }
            }
            ModifierId::UnfieldedSearchFieldNames => {
                if value.is_empty() {
                    return Err(CallunaError::InvalidModifier);
                }
                self.unfielded_search_field_names.extend(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|n| !n.is_empty())
                        .map(str::to_lowercase),
                );
            }
            ModifierId::Sort => {
                self.sort = parse_sort(value)?;
            }
            ModifierId::TermWeight => {
                self.term_weight = parse_float(value, CallunaError::InvalidTermWeight)?;
            }
            ModifierId::FeedbackTermWeight => {
                self.feedback_term_weight =
                    parse_float(value, CallunaError::InvalidFeedbackTermWeight)?;
            }
            ModifierId::FrequentTermCoverageThreshold => {
                self.frequent_term_coverage_threshold =
                    parse_float(value, CallunaError::InvalidFrequentTermCoverageThreshold)?;
            }
            ModifierId::FeedbackMinimumTermCount => {
                self.feedback_minimum_term_count =
                    parse_number(value, CallunaError::InvalidFeedbackMinimumTermCount)?;
            }
            ModifierId::FeedbackMaximumTermPercentage => {
                self.feedback_maximum_term_percentage =
                    parse_float(value, CallunaError::InvalidFeedbackMaximumTermPercentage)?;
            }
            ModifierId::FeedbackMaximumTermCoverageThreshold => {
                self.feedback_maximum_term_coverage_threshold = parse_float(
                    value,
                    CallunaError::InvalidFeedbackMaximumTermCoverageThreshold,
                )?;
            }
            ModifierId::ConnectionTimeout => {
                self.connection_timeout =
                    parse_number(value, CallunaError::InvalidConnectionTimeout)?;
            }
            ModifierId::SearchTimeout => {
                self.search_timeout = parse_number(value, CallunaError::InvalidSearchTimeout)?;
            }
            ModifierId::RetrievalTimeout => {
                self.retrieval_timeout =
                    parse_number(value, CallunaError::InvalidRetrievalTimeout)?;
            }
            ModifierId::InformationTimeout => {
                self.information_timeout =
                    parse_number(value, CallunaError::InvalidInformationTimeout)?;
            }
            ModifierId::SegmentsSearchedMaximum => {
                self.segments_searched_maximum =
                    parse_number(value, CallunaError::InvalidSegmentsSearchedMaximum)?;
            }
            ModifierId::SegmentsSearchedMinimum => {
                self.segments_searched_minimum =
                    parse_number(value, CallunaError::InvalidSegmentsSearchedMinimum)?;
            }
            ModifierId::ExclusionFilter => {
                self.exclusion_filters.push(parse_filter(
                    value,
                    FilterKind::Terms,
                    CallunaError::InvalidExclusionFilter,
                )?);
            }
            ModifierId::InclusionFilter => {
                self.inclusion_filters.push(parse_filter(
                    value,
                    FilterKind::Terms,
                    CallunaError::InvalidInclusionFilter,
                )?);
            }
            ModifierId::ExclusionListFilter => {
                self.exclusion_filters.push(parse_filter(
                    value,
                    FilterKind::List,
                    CallunaError::InvalidExclusionFilter,
                )?);
            }
            ModifierId::InclusionListFilter => {
                self.inclusion_filters.push(parse_filter(
                    value,
                    FilterKind::List,
                    CallunaError::InvalidInclusionFilter,
                )?);
            }
            ModifierId::Language => {
                if value.is_empty() {
                    return Err(CallunaError::InvalidLanguage);
                }
                for code in value.split(',') {
                    let id = language::language_id_from_code(code.trim())
                        .map_err(|_| CallunaError::InvalidLanguage)?;
                    self.languages.push(ParserNumber {
                        number: id as u64,
                        range: RangeOp::Equal,
                    });
                }
            }
            ModifierId::Tag => {
                if value.is_empty() {
                    return Err(CallunaError::InvalidModifier);
                }
                self.tag = Some(value.to_string());
            }
        }
        Ok(())
    }

    /// Render the non-default modifiers back as brace tokens, in table
    /// order, for the fully-normalized search text.
    pub fn render(&self) -> Vec<String> {
        let defaults = Modifiers::default();
        let mut out = Vec::new();

        if self.search_results != defaults.search_results {
            out.push("{search_results:suppress}".to_string());
        }
        if self.search_report != defaults.search_report {
            out.push("{search_report:suppress}".to_string());
        }
        if self.search_cache_enabled != defaults.search_cache_enabled {
            out.push("{search_cache:disable}".to_string());
        }
        if self.debug_enabled {
            out.push("{debug:enable}".to_string());
        }
        if self.boolean_operator != defaults.boolean_operator {
            out.push(format!(
                "{{boolean_operator:{}}}",
                self.boolean_operator.as_str().to_lowercase()
            ));
        }
        if self.boolean_operation != defaults.boolean_operation {
            out.push("{boolean_operation:strict}".to_string());
        }
        if self.operator_case != defaults.operator_case {
            let case = match self.operator_case {
                OperatorCase::Any => "any",
                OperatorCase::Upper => "upper",
                OperatorCase::Lower => "lower",
            };
            out.push(format!("{{operator_case:{case}}}"));
        }
        if self.term_case != defaults.term_case {
            out.push("{term_case:keep}".to_string());
        }
        if self.frequent_terms != defaults.frequent_terms {
            out.push("{frequent_terms:drop}".to_string());
        }
        if self.search_type != defaults.search_type {
            out.push("{search_type:freetext}".to_string());
        }
        if !self.dates.is_empty() {
            let dates: Vec<String> = self
                .dates
                .iter()
                .map(|d| format!("{}{}", d.range.as_str(), d.number))
                .collect();
            out.push(format!("{{date{}}}", dates.join(",")));
        }
        if !self.unfielded_search_field_names.is_empty() {
            out.push(format!(
                "{{unfielded_search_field_names:{}}}",
                self.unfielded_search_field_names.join(",")
            ));
        }
        match &self.sort {
            Sort::Default => {}
            Sort::None => out.push("{sort:none}".to_string()),
            Sort::Field { name, order } => {
                out.push(format!("{{sort:{name}:{}}}", order.as_str()));
            }
        }
        if self.early_completion_enabled {
            out.push("{early_completion:enable}".to_string());
        }
        if self.term_weight != 0.0 {
            out.push(format!("{{term_weight:{}}}", self.term_weight));
        }
        if self.feedback_term_weight != 0.0 {
            out.push(format!(
                "{{feedback_term_weight:{}}}",
                self.feedback_term_weight
            ));
        }
        if self.frequent_term_coverage_threshold != 0.0 {
            out.push(format!(
                "{{frequent_term_coverage_threshold:{}}}",
                self.frequent_term_coverage_threshold
            ));
        }
        if self.feedback_minimum_term_count != 0 {
            out.push(format!(
                "{{feedback_minimum_term_count:{}}}",
                self.feedback_minimum_term_count
            ));
        }
        if self.feedback_maximum_term_percentage != 0.0 {
            out.push(format!(
                "{{feedback_maximum_term_percentage:{}}}",
                self.feedback_maximum_term_percentage
            ));
        }
        if self.feedback_maximum_term_coverage_threshold != 0.0 {
            out.push(format!(
                "{{feedback_maximum_term_coverage_threshold:{}}}",
                self.feedback_maximum_term_coverage_threshold
            ));
        }
        if self.connection_timeout != 0 {
            out.push(format!("{{connection_timeout:{}}}", self.connection_timeout));
        }
        if self.search_timeout != 0 {
            out.push(format!("{{search_timeout:{}}}", self.search_timeout));
        }
        if self.retrieval_timeout != 0 {
            out.push(format!("{{retrieval_timeout:{}}}", self.retrieval_timeout));
        }
        if self.information_timeout != 0 {
            out.push(format!(
                "{{information_timeout:{}}}",
                self.information_timeout
            ));
        }
        if self.segments_searched_maximum != 0 {
            out.push(format!(
                "{{segments_searched_maximum:{}}}",
                self.segments_searched_maximum
            ));
        }
        if self.segments_searched_minimum != 0 {
            out.push(format!(
                "{{segments_searched_minimum:{}}}",
                self.segments_searched_minimum
            ));
        }
        for filter in &self.exclusion_filters {
            let name = match filter.kind {
                FilterKind::Terms => "exclusion_filter",
                FilterKind::List => "exclusion_list_filter",
            };
            out.push(format!("{{{name}:{}}}", filter.filter));
        }
        for filter in &self.inclusion_filters {
            let name = match filter.kind {
                FilterKind::Terms => "inclusion_filter",
                FilterKind::List => "inclusion_list_filter",
            };
            out.push(format!("{{{name}:{}}}", filter.filter));
        }
        if !self.languages.is_empty() {
            let codes: Vec<&str> = self
                .languages
                .iter()
                .filter_map(|l| language::language_code_from_id(l.number as u32).ok())
                .collect();
            out.push(format!("{{language:{}}}", codes.join(",")));
        }
        if let Some(tag) = &self.tag {
            out.push(format!("{{tag:{tag}}}"));
        }

        out
    }
}

fn parse_return_suppress(value: &str) -> Result<ReturnSuppress> {
    match value.to_lowercase().as_str() {
        "return" => Ok(ReturnSuppress::Return),
        "suppress" => Ok(ReturnSuppress::Suppress),
        _ => Err(CallunaError::InvalidModifier),
    }
}

fn parse_enable_disable(value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "enable" => Ok(true),
        "disable" => Ok(false),
        _ => Err(CallunaError::InvalidModifier),
    }
}

fn parse_sort(value: &str) -> Result<Sort> {
    match value.to_lowercase().as_str() {
        "default" => Ok(Sort::Default),
        "none" => Ok(Sort::None),
        _ => {
            let (name, order) = value.rsplit_once(':').ok_or(CallunaError::InvalidSort)?;
            if name.is_empty() {
                return Err(CallunaError::InvalidSort);
            }
            let order = match order.to_lowercase().as_str() {
                "asc" => SortOrder::Asc,
                "desc" => SortOrder::Desc,
                _ => return Err(CallunaError::InvalidSortOrder),
            };
            Ok(Sort::Field {
                name: name.to_lowercase(),
                order,
            })
        }
    }
}

fn parse_float(value: &str, error: CallunaError) -> Result<f32> {
    match value.parse::<f32>() {
        Ok(parsed) if parsed.is_finite() && parsed >= 0.0 => Ok(parsed),
        _ => Err(error),
    }
}

fn parse_number(value: &str, error: CallunaError) -> Result<u32> {
    value.parse::<u32>().map_err(|_| error)
}

fn parse_filter(value: &str, kind: FilterKind, error: CallunaError) -> Result<ParserFilter> {
    if value.is_empty() {
        return Err(error);
    }
    Ok(ParserFilter {
        filter: value.to_lowercase(),
        kind,
    })
}
