//! Builtin spreadsheet functions and their registry.

use std::collections::HashMap;

use sheetlogic_primitives::{Coordinate, ErrorKind, EvaluatedValue, Range, MAX_COLUMN_COUNT, MAX_ROW_COUNT};

use crate::coerce::{self, to_bool, to_number, to_text};
use crate::criteria::{wildcard_match, Criterion};
use crate::dates::{serial_from_parts, serial_to_ymd};
use crate::eval::{CallContext, Operand};

/// Builtin implementation. `Err(kind)` becomes `EvaluatedValue::Error(kind)`.
pub type FunctionImpl = fn(&[Operand], &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind>;

#[derive(Debug, Clone, Copy)]
pub enum FunctionKind {
    /// Arguments are evaluated up front.
    Eager(FunctionImpl),
    /// `IF`/`IFERROR`: the evaluator picks which argument to evaluate.
    Conditional,
    /// Computes a reference at runtime (`INDIRECT`, `OFFSET`).
    Dynamic,
}

/// Function definition
#[derive(Debug, Clone, Copy)]
pub struct FunctionDefinition {
    pub name: &'static str,
    pub min_args: usize,
    pub max_args: Option<usize>,
    /// Whether `f(a,,b)`-style omitted arguments are accepted.
    pub allows_empty_args: bool,
    /// Whether error-valued arguments reach the implementation instead of
    /// short-circuiting the call.
    pub accepts_errors: bool,
    pub kind: FunctionKind,
}

impl FunctionDefinition {
    /// Fixed number of arguments
    pub fn fixed(name: &'static str, args: usize, eval: FunctionImpl) -> Self {
        Self::range(name, args, args, eval)
    }

    /// Range of arguments
    pub fn range(name: &'static str, min: usize, max: usize, eval: FunctionImpl) -> Self {
        Self {
            name,
            min_args: min,
            max_args: Some(max),
            allows_empty_args: false,
            accepts_errors: false,
            kind: FunctionKind::Eager(eval),
        }
    }

    /// Variable number of arguments
    pub fn variadic(name: &'static str, min: usize, eval: FunctionImpl) -> Self {
        Self {
            max_args: None,
            ..Self::range(name, min, min, eval)
        }
    }

    fn special(name: &'static str, min: usize, max: usize, kind: FunctionKind) -> Self {
        Self {
            name,
            min_args: min,
            max_args: Some(max),
            allows_empty_args: false,
            accepts_errors: false,
            kind,
        }
    }

    #[must_use]
    pub fn with_empty_args(mut self) -> Self {
        self.allows_empty_args = true;
        self
    }

    #[must_use]
    pub fn with_error_args(mut self) -> Self {
        self.accepts_errors = true;
        self
    }

    /// Check an argument count. The error carries the expected-count label.
    pub fn check_arity(&self, provided: usize, has_empty: bool) -> Result<(), String> {
        if provided < self.min_args || self.max_args.is_some_and(|max| provided > max) {
            return Err(self.expected_args_label());
        }
        if has_empty && !self.allows_empty_args {
            return Err(format!("{} non-empty", self.expected_args_label()));
        }
        Ok(())
    }

    pub fn expected_args_label(&self) -> String {
        match self.max_args {
            Some(max) if max == self.min_args => format!("{}", self.min_args),
            Some(max) => format!("{}..{}", self.min_args, max),
            None => format!("{}+", self.min_args),
        }
    }
}

/// Function registry, keyed by upper-case name.
#[derive(Debug, Clone)]
pub struct FunctionRegistry {
    functions: HashMap<String, FunctionDefinition>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            functions: HashMap::new(),
        };
        registry.register_builtins();
        registry
    }

    fn register_builtins(&mut self) {
        use FunctionDefinition as F;

        // Aggregates
        self.register(F::variadic("SUM", 1, sum));
        self.register(F::variadic("PRODUCT", 1, product));
        self.register(F::variadic("AVERAGE", 1, average));
        self.register(F::variadic("COUNT", 1, count).with_error_args());
        self.register(F::variadic("COUNTA", 1, counta).with_error_args());
        self.register(F::variadic("MAX", 1, max));
        self.register(F::variadic("MIN", 1, min));
        self.register(F::range("SUMIF", 2, 3, sumif));
        self.register(F::variadic("SUMIFS", 3, sumifs));
        self.register(F::fixed("COUNTIF", 2, countif));
        self.register(F::range("AVERAGEIF", 2, 3, averageif));

        // Math
        self.register(F::fixed("ABS", 1, abs));
        self.register(F::range("ROUND", 1, 2, round).with_empty_args());
        self.register(F::range("ROUNDUP", 1, 2, roundup).with_empty_args());
        self.register(F::range("ROUNDDOWN", 1, 2, rounddown).with_empty_args());
        self.register(F::fixed("INT", 1, int));
        self.register(F::fixed("MOD", 2, mod_fn));
        self.register(F::fixed("POWER", 2, power));
        self.register(F::fixed("SQRT", 1, sqrt));

        // Logic
        self.register(F::special("IF", 2, 3, FunctionKind::Conditional).with_empty_args());
        self.register(
            F::special("IFERROR", 2, 2, FunctionKind::Conditional)
                .with_empty_args()
                .with_error_args(),
        );
        self.register(F::variadic("AND", 1, and_fn));
        self.register(F::variadic("OR", 1, or_fn));
        self.register(F::fixed("NOT", 1, not_fn));

        // Text
        self.register(F::variadic("CONCAT", 1, concat));
        self.register(F::variadic("CONCATENATE", 1, concatenate));
        self.register(F::fixed("LEN", 1, len));
        self.register(F::range("LEFT", 1, 2, left));
        self.register(F::range("RIGHT", 1, 2, right));
        self.register(F::fixed("MID", 3, mid));
        self.register(F::fixed("UPPER", 1, upper));
        self.register(F::fixed("LOWER", 1, lower));
        self.register(F::fixed("TRIM", 1, trim));

        // Lookup
        self.register(F::range("VLOOKUP", 3, 4, vlookup).with_empty_args());
        self.register(F::range("HLOOKUP", 3, 4, hlookup).with_empty_args());
        self.register(F::range("INDEX", 2, 3, index));
        self.register(F::range("MATCH", 2, 3, match_fn));

        // Date
        self.register(F::fixed("DATE", 3, date));
        self.register(F::fixed("YEAR", 1, year));
        self.register(F::fixed("MONTH", 1, month));
        self.register(F::fixed("DAY", 1, day));

        // Information
        self.register(F::fixed("ISBLANK", 1, isblank).with_error_args());
        self.register(F::fixed("ISERROR", 1, iserror).with_error_args());
        self.register(F::fixed("ISNUMBER", 1, isnumber).with_error_args());
        self.register(F::fixed("ISTEXT", 1, istext).with_error_args());

        // Dynamic references
        self.register(F::special("INDIRECT", 1, 2, FunctionKind::Dynamic));
        self.register(F::special("OFFSET", 3, 5, FunctionKind::Dynamic));
    }

    pub fn register(&mut self, def: FunctionDefinition) {
        self.functions.insert(def.name.to_ascii_uppercase(), def);
    }

    /// Check if a function exists
    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(&name.to_ascii_uppercase())
    }

    /// Get a function definition by name
    pub fn get(&self, name: &str) -> Option<&FunctionDefinition> {
        self.functions.get(&name.to_ascii_uppercase())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

fn value_arg(args: &[Operand], index: usize, ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    let value = args
        .get(index)
        .map_or(EvaluatedValue::Empty, |operand| ctx.scalar(operand));
    match value {
        EvaluatedValue::Error(kind) => Err(kind),
        other => Ok(other),
    }
}

fn number_arg(args: &[Operand], index: usize, ctx: &CallContext<'_>) -> Result<f64, ErrorKind> {
    to_number(&value_arg(args, index, ctx)?)
}

fn optional_number(
    args: &[Operand],
    index: usize,
    ctx: &CallContext<'_>,
    default: f64,
) -> Result<f64, ErrorKind> {
    if index < args.len() {
        number_arg(args, index, ctx)
    } else {
        Ok(default)
    }
}

fn text_arg(args: &[Operand], index: usize, ctx: &CallContext<'_>) -> Result<String, ErrorKind> {
    to_text(&value_arg(args, index, ctx)?)
}

/// 1-based position argument.
fn position_arg(args: &[Operand], index: usize, ctx: &CallContext<'_>) -> Result<usize, ErrorKind> {
    let n = number_arg(args, index, ctx)?.trunc();
    if n < 1.0 {
        return Err(ErrorKind::ValueError);
    }
    Ok(n as usize)
}

fn count_arg(args: &[Operand], index: usize, ctx: &CallContext<'_>, default: f64) -> Result<usize, ErrorKind> {
    let n = optional_number(args, index, ctx, default)?.trunc();
    if n < 0.0 {
        return Err(ErrorKind::ValueError);
    }
    Ok(n as usize)
}

fn range_arg(operand: &Operand) -> Result<Range, ErrorKind> {
    match operand {
        Operand::Range(range) => Ok(range.clone()),
        Operand::Cell(coord) => Range::new(coord.clone(), coord.clone()).map_err(|_| ErrorKind::Reference),
        Operand::Value(EvaluatedValue::Error(kind)) => Err(*kind),
        Operand::Value(_) | Operand::Array(_) => Err(ErrorKind::ValueError),
    }
}

/// Numbers for the numeric aggregates. Direct scalars are coerced; range
/// cells that are not numbers are skipped; errors anywhere propagate.
fn collect_numbers(args: &[Operand], ctx: &CallContext<'_>) -> Result<Vec<f64>, ErrorKind> {
    let mut numbers = Vec::new();
    for arg in args {
        match arg {
            Operand::Value(EvaluatedValue::Empty) => {}
            Operand::Value(value) => numbers.push(to_number(value)?),
            _ => {
                for value in ctx.values(arg) {
                    match value {
                        EvaluatedValue::Number(n) | EvaluatedValue::DateSerial(n) => numbers.push(n),
                        EvaluatedValue::Error(kind) => return Err(kind),
                        _ => {}
                    }
                }
            }
        }
    }
    Ok(numbers)
}

fn collect_logicals(args: &[Operand], ctx: &CallContext<'_>) -> Result<Vec<bool>, ErrorKind> {
    let mut logicals = Vec::new();
    for arg in args {
        match arg {
            Operand::Value(EvaluatedValue::Empty) => {}
            Operand::Value(value) => logicals.push(to_bool(value)?),
            _ => {
                for value in ctx.values(arg) {
                    match value {
                        EvaluatedValue::Boolean(b) => logicals.push(b),
                        EvaluatedValue::Number(n) | EvaluatedValue::DateSerial(n) => logicals.push(n != 0.0),
                        EvaluatedValue::Error(kind) => return Err(kind),
                        _ => {}
                    }
                }
            }
        }
    }
    if logicals.is_empty() {
        return Err(ErrorKind::ValueError);
    }
    Ok(logicals)
}

// ---------------------------------------------------------------------------
// Aggregates
// ---------------------------------------------------------------------------

pub fn sum(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    Ok(EvaluatedValue::Number(collect_numbers(args, ctx)?.iter().sum()))
}

pub fn product(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    let numbers = collect_numbers(args, ctx)?;
    if numbers.is_empty() {
        return Ok(EvaluatedValue::Number(0.0));
    }
    finite(numbers.iter().product())
}

pub fn average(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    let numbers = collect_numbers(args, ctx)?;
    if numbers.is_empty() {
        return Err(ErrorKind::DivideByZero);
    }
    Ok(EvaluatedValue::Number(numbers.iter().sum::<f64>() / numbers.len() as f64))
}

pub fn max(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    let numbers = collect_numbers(args, ctx)?;
    Ok(EvaluatedValue::Number(
        numbers.into_iter().reduce(f64::max).unwrap_or(0.0),
    ))
}

pub fn min(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    let numbers = collect_numbers(args, ctx)?;
    Ok(EvaluatedValue::Number(
        numbers.into_iter().reduce(f64::min).unwrap_or(0.0),
    ))
}

pub fn count(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    let mut total = 0usize;
    for arg in args {
        match arg {
            Operand::Value(value @ (EvaluatedValue::Text(_) | EvaluatedValue::Boolean(_))) => {
                if to_number(value).is_ok() {
                    total += 1;
                }
            }
            Operand::Value(value) => {
                if value.is_numeric() {
                    total += 1;
                }
            }
            _ => total += ctx.values(arg).iter().filter(|v| v.is_numeric()).count(),
        }
    }
    Ok(EvaluatedValue::Number(total as f64))
}

pub fn counta(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    let total = args
        .iter()
        .flat_map(|arg| ctx.values(arg))
        .filter(|value| !matches!(value, EvaluatedValue::Empty))
        .count();
    Ok(EvaluatedValue::Number(total as f64))
}

/// Values of `target` at every offset where all `(range, criterion)` pairs
/// match. The first criteria range drives the scan.
fn matched_values(
    ctx: &CallContext<'_>,
    criteria: &[(Range, Criterion)],
    target: &Range,
) -> Result<Vec<EvaluatedValue>, ErrorKind> {
    let Some((driver, driver_criterion)) = criteria.first() else {
        return Err(ErrorKind::ValueError);
    };
    let same_shape = |range: &Range| range.rows() == target.rows() && range.columns() == target.columns();
    if !criteria.iter().all(|(range, _)| same_shape(range)) {
        return Err(ErrorKind::ValueError);
    }

    let tolerance = ctx.options.numeric_tolerance;
    let mut matched = Vec::new();
    for (coord, value) in ctx.cells(driver) {
        if !driver_criterion.matches(&value, tolerance) {
            continue;
        }
        let Some((row, column)) = driver.offset_of(&coord) else {
            continue;
        };
        let all_match = criteria[1..].iter().all(|(range, criterion)| {
            criterion.matches(&ctx.source.value(&shift(range.start(), row, column)), tolerance)
        });
        if all_match {
            matched.push(ctx.source.value(&shift(target.start(), row, column)));
        }
    }
    Ok(matched)
}

fn shift(origin: &Coordinate, rows: u32, columns: u32) -> Coordinate {
    Coordinate::new(origin.sheet.clone(), origin.column + columns, origin.row + rows)
}

/// A range with `origin` as top-left and the same shape as `like`.
fn resized(origin: &Coordinate, like: &Range) -> Result<Range, ErrorKind> {
    let end = Coordinate::new(
        origin.sheet.clone(),
        (origin.column + like.columns() - 1).min(MAX_COLUMN_COUNT),
        (origin.row + like.rows() - 1).min(MAX_ROW_COUNT),
    );
    Range::new(origin.clone(), end).map_err(|_| ErrorKind::Reference)
}

fn single_criterion(
    args: &[Operand],
    ctx: &CallContext<'_>,
) -> Result<(Vec<(Range, Criterion)>, Range), ErrorKind> {
    let criteria_range = range_arg(&args[0])?;
    let criterion = Criterion::parse(&value_arg(args, 1, ctx)?);
    let target = match args.get(2) {
        Some(operand) => resized(range_arg(operand)?.start(), &criteria_range)?,
        None => criteria_range.clone(),
    };
    Ok((vec![(criteria_range, criterion)], target))
}

fn numeric_sum(values: &[EvaluatedValue]) -> Result<(f64, usize), ErrorKind> {
    let mut total = 0.0;
    let mut count = 0;
    for value in values {
        match value {
            EvaluatedValue::Number(n) | EvaluatedValue::DateSerial(n) => {
                total += n;
                count += 1;
            }
            EvaluatedValue::Error(kind) => return Err(*kind),
            _ => {}
        }
    }
    Ok((total, count))
}

/// SUMIF(range, criteria, [sum_range])
pub fn sumif(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    let (criteria, target) = single_criterion(args, ctx)?;
    let (total, _) = numeric_sum(&matched_values(ctx, &criteria, &target)?)?;
    Ok(EvaluatedValue::Number(total))
}

/// SUMIFS(sum_range, criteria_range1, criteria1, ...)
pub fn sumifs(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    if args.len() % 2 == 0 {
        return Err(ErrorKind::ValueError);
    }
    let target = range_arg(&args[0])?;
    let mut criteria = Vec::with_capacity(args.len() / 2);
    for pair in args[1..].chunks(2) {
        let range = range_arg(&pair[0])?;
        let criterion = Criterion::parse(&value_arg(pair, 1, ctx)?);
        criteria.push((range, criterion));
    }
    let (total, _) = numeric_sum(&matched_values(ctx, &criteria, &target)?)?;
    Ok(EvaluatedValue::Number(total))
}

/// COUNTIF(range, criteria)
pub fn countif(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    let (criteria, target) = single_criterion(args, ctx)?;
    let matched = matched_values(ctx, &criteria, &target)?;
    Ok(EvaluatedValue::Number(matched.len() as f64))
}

/// AVERAGEIF(range, criteria, [average_range])
pub fn averageif(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    let (criteria, target) = single_criterion(args, ctx)?;
    let (total, count) = numeric_sum(&matched_values(ctx, &criteria, &target)?)?;
    if count == 0 {
        return Err(ErrorKind::DivideByZero);
    }
    Ok(EvaluatedValue::Number(total / count as f64))
}

// ---------------------------------------------------------------------------
// Math
// ---------------------------------------------------------------------------

fn finite(n: f64) -> Result<EvaluatedValue, ErrorKind> {
    if n.is_finite() {
        Ok(EvaluatedValue::Number(n))
    } else {
        Err(ErrorKind::Num)
    }
}

pub fn abs(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    finite(number_arg(args, 0, ctx)?.abs())
}

#[derive(Clone, Copy)]
enum Rounding {
    Nearest,
    Up,
    Down,
}

fn round_with(args: &[Operand], ctx: &CallContext<'_>, mode: Rounding) -> Result<EvaluatedValue, ErrorKind> {
    let n = number_arg(args, 0, ctx)?;
    let digits = optional_number(args, 1, ctx, 0.0)?.trunc().clamp(-15.0, 15.0) as i32;
    let factor = 10f64.powi(digits.abs());
    let scaled = if digits >= 0 { n * factor } else { n / factor };
    let rounded = match mode {
        // absorb binary representation error (2.675 * 100 = 267.49999...)
        Rounding::Nearest => (scaled + scaled * f64::EPSILON * 4.0).round(),
        Rounding::Up => scaled.abs().ceil().copysign(scaled),
        Rounding::Down => scaled.trunc(),
    };
    finite(if digits >= 0 { rounded / factor } else { rounded * factor })
}

pub fn round(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    round_with(args, ctx, Rounding::Nearest)
}

pub fn roundup(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    round_with(args, ctx, Rounding::Up)
}

pub fn rounddown(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    round_with(args, ctx, Rounding::Down)
}

pub fn int(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    finite(number_arg(args, 0, ctx)?.floor())
}

/// Result takes the sign of the divisor.
pub fn mod_fn(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    let n = number_arg(args, 0, ctx)?;
    let d = number_arg(args, 1, ctx)?;
    if d == 0.0 {
        return Err(ErrorKind::DivideByZero);
    }
    finite(n - d * (n / d).floor())
}

pub fn power(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    let base = value_arg(args, 0, ctx)?;
    let exponent = value_arg(args, 1, ctx)?;
    match coerce::power(&base, &exponent) {
        EvaluatedValue::Error(kind) => Err(kind),
        value => Ok(value),
    }
}

pub fn sqrt(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    let n = number_arg(args, 0, ctx)?;
    if n < 0.0 {
        return Err(ErrorKind::Num);
    }
    finite(n.sqrt())
}

// ---------------------------------------------------------------------------
// Logic
// ---------------------------------------------------------------------------

pub fn and_fn(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    Ok(EvaluatedValue::Boolean(collect_logicals(args, ctx)?.into_iter().all(|b| b)))
}

pub fn or_fn(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    Ok(EvaluatedValue::Boolean(collect_logicals(args, ctx)?.into_iter().any(|b| b)))
}

pub fn not_fn(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    Ok(EvaluatedValue::Boolean(!to_bool(&value_arg(args, 0, ctx)?)?))
}

// ---------------------------------------------------------------------------
// Text
// ---------------------------------------------------------------------------

/// CONCAT flattens ranges.
pub fn concat(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    let mut out = String::new();
    for value in args.iter().flat_map(|arg| ctx.values(arg)) {
        out.push_str(&to_text(&value)?);
    }
    Ok(EvaluatedValue::Text(out))
}

/// CONCATENATE takes scalars only.
pub fn concatenate(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    let mut out = String::new();
    for index in 0..args.len() {
        out.push_str(&text_arg(args, index, ctx)?);
    }
    Ok(EvaluatedValue::Text(out))
}

pub fn len(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    Ok(EvaluatedValue::Number(text_arg(args, 0, ctx)?.chars().count() as f64))
}

pub fn left(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    let text = text_arg(args, 0, ctx)?;
    let n = count_arg(args, 1, ctx, 1.0)?;
    Ok(EvaluatedValue::Text(text.chars().take(n).collect()))
}

pub fn right(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    let text = text_arg(args, 0, ctx)?;
    let n = count_arg(args, 1, ctx, 1.0)?;
    let total = text.chars().count();
    Ok(EvaluatedValue::Text(text.chars().skip(total.saturating_sub(n)).collect()))
}

/// MID(text, start, count)
pub fn mid(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    let text = text_arg(args, 0, ctx)?;
    let start = position_arg(args, 1, ctx)?;
    let n = count_arg(args, 2, ctx, 0.0)?;
    Ok(EvaluatedValue::Text(text.chars().skip(start - 1).take(n).collect()))
}

pub fn upper(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    Ok(EvaluatedValue::Text(text_arg(args, 0, ctx)?.to_uppercase()))
}

pub fn lower(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    Ok(EvaluatedValue::Text(text_arg(args, 0, ctx)?.to_lowercase()))
}

/// Strip leading/trailing spaces and collapse inner runs to one space.
pub fn trim(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    let text = text_arg(args, 0, ctx)?;
    let trimmed: Vec<&str> = text.split(' ').filter(|part| !part.is_empty()).collect();
    Ok(EvaluatedValue::Text(trimmed.join(" ")))
}

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

static EMPTY: EvaluatedValue = EvaluatedValue::Empty;

/// A lookup table view over a range or array. For large ranges only the
/// bound extent is materialized; `height`/`width` keep the declared shape.
struct Table {
    height: usize,
    width: usize,
    rows: Vec<Vec<EvaluatedValue>>,
}

impl Table {
    fn from_operand(operand: &Operand, ctx: &CallContext<'_>) -> Self {
        match operand {
            Operand::Value(value) => Self::single(value.clone()),
            Operand::Cell(coord) => Self::single(ctx.source.value(coord)),
            Operand::Array(rows) => Self {
                height: rows.len(),
                width: rows.iter().map(Vec::len).max().unwrap_or(0),
                rows: rows.clone(),
            },
            Operand::Range(range) => {
                let height = range.rows() as usize;
                let width = range.columns() as usize;
                let mut rows: Vec<Vec<EvaluatedValue>> = Vec::new();
                for (coord, value) in ctx.cells(range) {
                    let Some((row, column)) = range.offset_of(&coord) else {
                        continue;
                    };
                    let (row, column) = (row as usize, column as usize);
                    if rows.len() <= row {
                        rows.resize_with(row + 1, Vec::new);
                    }
                    let cells = &mut rows[row];
                    if cells.len() <= column {
                        cells.resize(column + 1, EvaluatedValue::Empty);
                    }
                    cells[column] = value;
                }
                Self { height, width, rows }
            }
        }
    }

    fn single(value: EvaluatedValue) -> Self {
        Self {
            height: 1,
            width: 1,
            rows: vec![vec![value]],
        }
    }

    fn get(&self, row: usize, column: usize) -> &EvaluatedValue {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .unwrap_or(&EMPTY)
    }

    fn column(&self, column: usize) -> Vec<EvaluatedValue> {
        (0..self.rows.len()).map(|row| self.get(row, column).clone()).collect()
    }

    fn row(&self, row: usize) -> Vec<EvaluatedValue> {
        self.rows.get(row).cloned().unwrap_or_default()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum MatchMode {
    Exact,
    /// Largest key <= lookup; keys sorted ascending.
    LessOrEqual,
    /// Smallest key >= lookup; keys sorted descending.
    GreaterOrEqual,
}

fn lookup_position(
    keys: &[EvaluatedValue],
    lookup: &EvaluatedValue,
    mode: MatchMode,
    tolerance: f64,
) -> Option<usize> {
    match mode {
        MatchMode::Exact => keys.iter().position(|key| exact_match(key, lookup, tolerance)),
        MatchMode::LessOrEqual | MatchMode::GreaterOrEqual => {
            let mut best = None;
            for (i, key) in keys.iter().enumerate() {
                if matches!(key, EvaluatedValue::Empty) {
                    continue;
                }
                match coerce::compare(key, lookup, tolerance) {
                    Some(ordering) if ordering.is_eq() => return Some(i),
                    Some(ordering) if ordering.is_lt() == (mode == MatchMode::LessOrEqual) => {
                        best = Some(i);
                    }
                    Some(_) => break,
                    None => continue,
                }
            }
            best
        }
    }
}

fn exact_match(key: &EvaluatedValue, lookup: &EvaluatedValue, tolerance: f64) -> bool {
    match (key, lookup) {
        (EvaluatedValue::Empty, other) => matches!(other, EvaluatedValue::Empty),
        (EvaluatedValue::Text(k), EvaluatedValue::Text(l)) if l.contains(['*', '?', '~']) => {
            wildcard_match(&l.to_lowercase(), &k.to_lowercase())
        }
        _ => coerce::equal(key, lookup, tolerance),
    }
}

fn approximate_arg(args: &[Operand], index: usize, ctx: &CallContext<'_>) -> Result<bool, ErrorKind> {
    match args.get(index) {
        Some(_) => to_bool(&value_arg(args, index, ctx)?),
        None => Ok(true),
    }
}

/// VLOOKUP(lookup_value, table_array, col_index_num, [range_lookup])
pub fn vlookup(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    let lookup = value_arg(args, 0, ctx)?;
    let table = Table::from_operand(&args[1], ctx);
    let column = position_arg(args, 2, ctx)?;
    if column > table.width {
        return Err(ErrorKind::Reference);
    }
    let mode = if approximate_arg(args, 3, ctx)? {
        MatchMode::LessOrEqual
    } else {
        MatchMode::Exact
    };
    let row = lookup_position(&table.column(0), &lookup, mode, ctx.options.numeric_tolerance)
        .ok_or(ErrorKind::NotFound)?;
    Ok(table.get(row, column - 1).clone())
}

/// HLOOKUP(lookup_value, table_array, row_index_num, [range_lookup])
pub fn hlookup(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    let lookup = value_arg(args, 0, ctx)?;
    let table = Table::from_operand(&args[1], ctx);
    let row = position_arg(args, 2, ctx)?;
    if row > table.height {
        return Err(ErrorKind::Reference);
    }
    let mode = if approximate_arg(args, 3, ctx)? {
        MatchMode::LessOrEqual
    } else {
        MatchMode::Exact
    };
    let column = lookup_position(&table.row(0), &lookup, mode, ctx.options.numeric_tolerance)
        .ok_or(ErrorKind::NotFound)?;
    Ok(table.get(row - 1, column).clone())
}

/// INDEX(array, row_num, [column_num])
pub fn index(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    let table = Table::from_operand(&args[0], ctx);
    let first = number_arg(args, 1, ctx)?.trunc();
    let second = optional_number(args, 2, ctx, 0.0)?.trunc();
    if first < 0.0 || second < 0.0 {
        return Err(ErrorKind::ValueError);
    }
    let (mut row, mut column) = (first as usize, second as usize);
    // a single row indexed with one number addresses its columns
    if args.len() == 2 && table.height == 1 {
        column = row;
        row = 1;
    }
    if row == 0 && table.height == 1 {
        row = 1;
    }
    if column == 0 && table.width == 1 {
        column = 1;
    }
    if row == 0 || column == 0 {
        return Err(ErrorKind::ValueError);
    }
    if row > table.height || column > table.width {
        return Err(ErrorKind::Reference);
    }
    Ok(table.get(row - 1, column - 1).clone())
}

/// MATCH(lookup_value, lookup_array, [match_type])
pub fn match_fn(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    let lookup = value_arg(args, 0, ctx)?;
    let table = Table::from_operand(&args[1], ctx);
    let keys = if table.height == 1 {
        table.row(0)
    } else if table.width == 1 {
        table.column(0)
    } else {
        return Err(ErrorKind::NotFound);
    };
    let match_type = optional_number(args, 2, ctx, 1.0)?;
    let mode = if match_type == 0.0 {
        MatchMode::Exact
    } else if match_type > 0.0 {
        MatchMode::LessOrEqual
    } else {
        MatchMode::GreaterOrEqual
    };
    let position = lookup_position(&keys, &lookup, mode, ctx.options.numeric_tolerance)
        .ok_or(ErrorKind::NotFound)?;
    Ok(EvaluatedValue::Number((position + 1) as f64))
}

// ---------------------------------------------------------------------------
// Date
// ---------------------------------------------------------------------------

pub fn date(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    let year = number_arg(args, 0, ctx)?;
    let month = number_arg(args, 1, ctx)?;
    let day = number_arg(args, 2, ctx)?;
    serial_from_parts(year, month, day, ctx.options.date_epoch)
        .map(EvaluatedValue::DateSerial)
        .ok_or(ErrorKind::Num)
}

fn date_part(
    args: &[Operand],
    ctx: &CallContext<'_>,
    pick: fn((i32, u32, u32)) -> f64,
) -> Result<EvaluatedValue, ErrorKind> {
    let serial = number_arg(args, 0, ctx)?;
    serial_to_ymd(serial, ctx.options.date_epoch)
        .map(|parts| EvaluatedValue::Number(pick(parts)))
        .ok_or(ErrorKind::Num)
}

pub fn year(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    date_part(args, ctx, |(y, _, _)| f64::from(y))
}

pub fn month(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    date_part(args, ctx, |(_, m, _)| f64::from(m))
}

pub fn day(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    date_part(args, ctx, |(_, _, d)| f64::from(d))
}

// ---------------------------------------------------------------------------
// Information
// ---------------------------------------------------------------------------

fn info(args: &[Operand], ctx: &CallContext<'_>, test: fn(&EvaluatedValue) -> bool) -> Result<EvaluatedValue, ErrorKind> {
    let value = args.first().map_or(EvaluatedValue::Empty, |arg| ctx.scalar(arg));
    Ok(EvaluatedValue::Boolean(test(&value)))
}

pub fn isblank(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    info(args, ctx, |v| matches!(v, EvaluatedValue::Empty))
}

pub fn iserror(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    info(args, ctx, EvaluatedValue::is_error)
}

pub fn isnumber(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    info(args, ctx, EvaluatedValue::is_numeric)
}

pub fn istext(args: &[Operand], ctx: &CallContext<'_>) -> Result<EvaluatedValue, ErrorKind> {
    info(args, ctx, |v| matches!(v, EvaluatedValue::Text(_)))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::eval::EvalOptions;

    fn num(n: f64) -> Operand {
        Operand::Value(EvaluatedValue::Number(n))
    }

    fn text(s: &str) -> Operand {
        Operand::Value(EvaluatedValue::Text(s.to_string()))
    }

    fn call(f: FunctionImpl, args: &[Operand]) -> Result<EvaluatedValue, ErrorKind> {
        let source: BTreeMap<Coordinate, EvaluatedValue> = BTreeMap::new();
        let options = EvalOptions::default();
        let ctx = CallContext {
            source: &source,
            options: &options,
        };
        f(args, &ctx)
    }

    #[test]
    fn test_registry_arity_labels() {
        let registry = FunctionRegistry::new();
        let sum = registry.get("sum").unwrap();
        assert!(sum.check_arity(3, false).is_ok());
        assert_eq!(sum.check_arity(0, false), Err("1+".to_string()));
        assert_eq!(sum.check_arity(2, true), Err("1+ non-empty".to_string()));
        let vlookup = registry.get("VLOOKUP").unwrap();
        assert!(vlookup.check_arity(4, true).is_ok());
        assert_eq!(vlookup.check_arity(5, false), Err("3..4".to_string()));
        assert!(matches!(registry.get("INDIRECT").unwrap().kind, FunctionKind::Dynamic));
    }

    #[test]
    fn test_direct_text_in_sum_is_value_error() {
        assert_eq!(call(sum, &[num(1.0), text("x")]), Err(ErrorKind::ValueError));
        assert_eq!(call(sum, &[num(1.0), text("2")]), Ok(EvaluatedValue::Number(3.0)));
    }

    #[test]
    fn test_average_of_nothing_divides_by_zero() {
        let empty = Operand::Array(vec![vec![EvaluatedValue::Text("a".into())]]);
        assert_eq!(call(average, &[empty]), Err(ErrorKind::DivideByZero));
    }

    #[test]
    fn test_rounding() {
        assert_eq!(call(round, &[num(2.675), num(2.0)]), Ok(EvaluatedValue::Number(2.68)));
        assert_eq!(call(round, &[num(-2.5)]), Ok(EvaluatedValue::Number(-3.0)));
        assert_eq!(call(round, &[num(1234.0), num(-2.0)]), Ok(EvaluatedValue::Number(1200.0)));
        assert_eq!(call(roundup, &[num(3.2)]), Ok(EvaluatedValue::Number(4.0)));
        assert_eq!(call(roundup, &[num(-3.2)]), Ok(EvaluatedValue::Number(-4.0)));
        assert_eq!(call(rounddown, &[num(3.99), num(1.0)]), Ok(EvaluatedValue::Number(3.9)));
    }

    #[test]
    fn test_mod_and_sqrt() {
        assert_eq!(call(mod_fn, &[num(-3.0), num(2.0)]), Ok(EvaluatedValue::Number(1.0)));
        assert_eq!(call(mod_fn, &[num(3.0), num(0.0)]), Err(ErrorKind::DivideByZero));
        assert_eq!(call(sqrt, &[num(-1.0)]), Err(ErrorKind::Num));
    }

    #[test]
    fn test_text_functions() {
        assert_eq!(call(left, &[text("hello"), num(2.0)]), Ok(EvaluatedValue::Text("he".into())));
        assert_eq!(call(right, &[text("hello")]), Ok(EvaluatedValue::Text("o".into())));
        assert_eq!(
            call(mid, &[text("spreadsheet"), num(7.0), num(5.0)]),
            Ok(EvaluatedValue::Text("sheet".into()))
        );
        assert_eq!(call(mid, &[text("abc"), num(0.0), num(1.0)]), Err(ErrorKind::ValueError));
        assert_eq!(call(trim, &[text("  a   b ")]), Ok(EvaluatedValue::Text("a b".into())));
        assert_eq!(call(len, &[num(12.5)]), Ok(EvaluatedValue::Number(4.0)));
    }

    #[test]
    fn test_lookup_on_arrays() {
        let table = Operand::Array(vec![
            vec![EvaluatedValue::Number(1.0), EvaluatedValue::Text("one".into())],
            vec![EvaluatedValue::Number(5.0), EvaluatedValue::Text("five".into())],
            vec![EvaluatedValue::Number(10.0), EvaluatedValue::Text("ten".into())],
        ]);
        assert_eq!(
            call(vlookup, &[num(7.0), table.clone(), num(2.0)]),
            Ok(EvaluatedValue::Text("five".into()))
        );
        assert_eq!(
            call(vlookup, &[num(7.0), table.clone(), num(2.0), Operand::Value(EvaluatedValue::Boolean(false))]),
            Err(ErrorKind::NotFound)
        );
        assert_eq!(call(vlookup, &[num(0.5), table.clone(), num(2.0)]), Err(ErrorKind::NotFound));
        assert_eq!(call(vlookup, &[num(1.0), table, num(3.0)]), Err(ErrorKind::Reference));
    }

    #[test]
    fn test_match_modes() {
        let ascending = Operand::Array(vec![vec![
            EvaluatedValue::Number(1.0),
            EvaluatedValue::Number(3.0),
            EvaluatedValue::Number(5.0),
        ]]);
        assert_eq!(call(match_fn, &[num(4.0), ascending.clone()]), Ok(EvaluatedValue::Number(2.0)));
        assert_eq!(call(match_fn, &[num(5.0), ascending, num(0.0)]), Ok(EvaluatedValue::Number(3.0)));
        let descending = Operand::Array(vec![vec![
            EvaluatedValue::Number(9.0),
            EvaluatedValue::Number(6.0),
            EvaluatedValue::Number(2.0),
        ]]);
        assert_eq!(call(match_fn, &[num(5.0), descending, num(-1.0)]), Ok(EvaluatedValue::Number(2.0)));
        let words = Operand::Array(vec![
            vec![EvaluatedValue::Text("Apple".into())],
            vec![EvaluatedValue::Text("Banana".into())],
        ]);
        assert_eq!(call(match_fn, &[text("b*"), words, num(0.0)]), Ok(EvaluatedValue::Number(2.0)));
    }

    #[test]
    fn test_index_one_dimensional() {
        let row = Operand::Array(vec![vec![
            EvaluatedValue::Number(10.0),
            EvaluatedValue::Number(20.0),
        ]]);
        assert_eq!(call(index, &[row.clone(), num(2.0)]), Ok(EvaluatedValue::Number(20.0)));
        assert_eq!(call(index, &[row, num(3.0)]), Err(ErrorKind::Reference));
    }

    #[test]
    fn test_date_parts() {
        let serial = call(date, &[num(2024.0), num(2.0), num(29.0)]).unwrap();
        let EvaluatedValue::DateSerial(n) = serial else {
            panic!("expected date serial");
        };
        assert_eq!(call(year, &[num(n)]), Ok(EvaluatedValue::Number(2024.0)));
        assert_eq!(call(month, &[num(n)]), Ok(EvaluatedValue::Number(2.0)));
        assert_eq!(call(day, &[num(n)]), Ok(EvaluatedValue::Number(29.0)));
        assert_eq!(call(date, &[num(10000.0), num(1.0), num(1.0)]), Err(ErrorKind::Num));
    }

    #[test]
    fn test_logic_functions() {
        let t = Operand::Value(EvaluatedValue::Boolean(true));
        let f = Operand::Value(EvaluatedValue::Boolean(false));
        assert_eq!(call(and_fn, &[t.clone(), f.clone()]), Ok(EvaluatedValue::Boolean(false)));
        assert_eq!(call(or_fn, &[t, f]), Ok(EvaluatedValue::Boolean(true)));
        assert_eq!(call(and_fn, &[text("maybe")]), Err(ErrorKind::ValueError));
        assert_eq!(call(not_fn, &[num(0.0)]), Ok(EvaluatedValue::Boolean(true)));
    }
}
