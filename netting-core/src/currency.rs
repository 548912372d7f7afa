//! Integer-cent money helpers
//!
//! Settlement math runs over thousands of transactions per cycle, so amounts
//! are moved into whole cents (`i64`) before any arithmetic that could round.
//! `Decimal` values entering the pipeline must be cent-aligned; everything
//! leaving it (fees, messages) is derived from cents.
//!
//! ```text
//! dollars_to_cents(12.345)   = 1235      (half-up at the cent boundary)
//! cents_to_dollars(1235)     = 12.35
//! format_currency(123456789) = "$1,234,567.89"
//! percentage_of(10000, 0.8%) = 80
//! ```

use crate::{Error, Result};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

/// Amount expressed in whole cents
pub type Cents = i64;

/// Largest cent amount accepted (2^53 - 1, the largest integer a JSON
/// consumer can represent exactly)
pub const MAX_SAFE_CENTS: Cents = 9_007_199_254_740_991;

const HALF: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

/// Convert a dollar amount to cents, rounding half-up at the cent boundary
pub fn dollars_to_cents(dollars: Decimal) -> Result<Cents> {
    let scaled = dollars
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|d| d.checked_add(HALF))
        .ok_or_else(|| Error::InvalidAmount(format!("{} overflows cent conversion", dollars)))?;

    scaled
        .floor()
        .to_i64()
        .ok_or_else(|| Error::InvalidAmount(format!("{} does not fit in cents", dollars)))
}

/// Convert a binary floating-point dollar amount to cents.
///
/// The float is first converted to the shortest decimal that round-trips,
/// so `0.1 + 0.2` becomes 30 cents rather than 30.000000000000004.
pub fn dollars_f64_to_cents(dollars: f64) -> Result<Cents> {
    if !dollars.is_finite() {
        return Err(Error::InvalidAmount(format!("{} is not finite", dollars)));
    }

    let decimal = Decimal::from_f64(dollars)
        .ok_or_else(|| Error::InvalidAmount(format!("{} is out of range", dollars)))?;
    dollars_to_cents(decimal)
}

/// Convert cents back to a two-decimal dollar amount
pub fn cents_to_dollars(cents: Cents) -> Decimal {
    Decimal::new(cents, 2)
}

/// Render cents as `$1,234.56` (negative amounts as `-$1,234.56`)
pub fn format_currency(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!(
        "{}${}.{:02}",
        sign,
        group_thousands(abs / 100),
        abs % 100
    )
}

/// Render a dollar amount with thousands separators.
///
/// Cent-aligned amounts render with exactly two decimals. Sub-cent amounts
/// keep every significant digit so they never print equal to a nearby
/// cent value. Amounts outside the cent range fall back to plain `Decimal`
/// formatting.
pub fn format_usd(dollars: Decimal) -> String {
    if !is_cent_aligned(dollars) {
        return format_exact(dollars);
    }

    match dollars_to_cents(dollars) {
        Ok(cents) => format_currency(cents),
        Err(_) => format!("${}", dollars),
    }
}

fn format_exact(dollars: Decimal) -> String {
    let sign = if dollars.is_sign_negative() { "-" } else { "" };
    let abs = dollars.abs().normalize();

    let Some(whole) = abs.trunc().to_u64() else {
        return format!("${}", dollars);
    };

    let text = abs.to_string();
    let fraction = text.split_once('.').map(|(_, f)| f).unwrap_or("");
    format!("{}${}.{}", sign, group_thousands(whole), fraction)
}

/// Render a fraction (`0.003`) as a percentage with two decimals (`0.30%`)
pub fn format_percent(fraction: Decimal) -> String {
    let pct = (fraction * Decimal::ONE_HUNDRED).round_dp(2);
    format!("{:.2}%", pct)
}

/// Insert `,` every three digits
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }

    out
}

/// `rate` percent of `cents`, rounded half-up to the nearest cent.
///
/// `rate` is a fraction: `0.008` is 0.8%.
pub fn percentage_of(cents: Cents, rate: Decimal) -> Result<Cents> {
    Decimal::from(cents)
        .checked_mul(rate)
        .and_then(|d| d.checked_add(HALF))
        .and_then(|d| d.floor().to_i64())
        .ok_or_else(|| Error::InvalidAmount(format!("{} x {} overflows", cents, rate)))
}

/// Checked sum of cent amounts
pub fn sum<I>(amounts: I) -> Result<Cents>
where
    I: IntoIterator<Item = Cents>,
{
    amounts.into_iter().try_fold(0i64, |acc, c| {
        acc.checked_add(c)
            .ok_or_else(|| Error::InvalidAmount("sum overflows".to_string()))
    })
}

/// Non-negative and no larger than [`MAX_SAFE_CENTS`]
pub fn is_valid_amount(cents: Cents) -> bool {
    (0..=MAX_SAFE_CENTS).contains(&cents)
}

/// Has no digits beyond the cent
pub fn is_cent_aligned(amount: Decimal) -> bool {
    amount.normalize().scale() <= 2
}
