use crate::model::{BookingConfig, ParticipantClass, PriceQuote};

use super::EngineError;

/// Price `count` participants of `class` for `duration` minutes.
///
/// Integer minor units throughout. The group discount is floored so rounding
/// never works against the customer.
pub fn calculate_price(
    config: &BookingConfig,
    class: ParticipantClass,
    duration: u32,
    count: u32,
) -> Result<PriceQuote, EngineError> {
    if count == 0 {
        return Err(EngineError::Validation("participant count must be positive".into()));
    }
    let unit_price = config
        .unit_price(class, duration)
        .ok_or(EngineError::UnpricedDuration { class, duration })?;
    let subtotal = unit_price
        .checked_mul(count as u64)
        .ok_or(EngineError::LimitExceeded("price overflow"))?;

    let group_discount_applied = config.group_discount_min_size > 0 && count >= config.group_discount_min_size;
    let discount_amount = if group_discount_applied {
        // subtotal fits u64 and percent <= 100, so the product fits u128
        (subtotal as u128 * config.group_discount_percent as u128 / 100) as u64
    } else {
        0
    };

    Ok(PriceQuote {
        unit_price,
        subtotal,
        group_discount_applied,
        discount_percent: if group_discount_applied { config.group_discount_percent } else { 0 },
        discount_amount,
        total: subtotal - discount_amount,
        currency: config.currency.clone(),
    })
}
