//! Local order validation, run before margin preflight and before any request id exists.

use super::{OpenOrders, OrderDraft};
use crate::domain::config::InstrumentConfig;
use crate::error::ValidationError;
use rust_decimal::{Decimal, RoundingStrategy};

/// Validate a batch of new orders.
pub fn validate_create(
    drafts: &[OrderDraft],
    instrument: &InstrumentConfig,
) -> Result<(), ValidationError> {
    if drafts.is_empty() {
        return Err(ValidationError::EmptyOrders);
    }
    for draft in drafts {
        if let Some(uuid) = &draft.uuid {
            return Err(ValidationError::UnexpectedOrderId(uuid.clone()));
        }
        validate_terms(draft, instrument)?;
    }
    Ok(())
}

/// Validate a batch of updates against the currently open orders.
pub fn validate_update(
    drafts: &[OrderDraft],
    open: &OpenOrders,
    instrument: &InstrumentConfig,
) -> Result<(), ValidationError> {
    if drafts.is_empty() {
        return Err(ValidationError::EmptyOrders);
    }
    for draft in drafts {
        let uuid = draft.uuid.as_ref().ok_or(ValidationError::MissingOrderId)?;
        if !open.contains(uuid) {
            return Err(ValidationError::UnknownOrder(uuid.clone()));
        }
        validate_terms(draft, instrument)?;
    }
    Ok(())
}

fn validate_terms(draft: &OrderDraft, instrument: &InstrumentConfig) -> Result<(), ValidationError> {
    if draft.quantity <= Decimal::ZERO || !draft.quantity.fract().is_zero() {
        return Err(ValidationError::InvalidQuantity(draft.quantity));
    }
    if draft.order_type.is_priced() {
        if draft.price <= Decimal::ZERO {
            return Err(ValidationError::InvalidPrice(draft.price));
        }
        if draft.price.round_dp(instrument.ticksize) != draft.price {
            return Err(ValidationError::PriceOffTick {
                price: draft.price,
                ticksize: instrument.ticksize,
            });
        }
    }
    Ok(())
}

/// Round a price to the instrument's tick precision (`ticksize` decimal places).
pub fn fixed_price(price: Decimal, instrument: &InstrumentConfig) -> Result<Decimal, ValidationError> {
    if price.is_zero() {
        return Err(ValidationError::InvalidPrice(price));
    }
    Ok(price
        .round_dp_with_strategy(instrument.ticksize, RoundingStrategy::MidpointAwayFromZero)
        .normalize())
}
