use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

use super::OrderParams;

/// Strategy for property keys that never collide with a member name
pub fn foreign_key_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,15}"
}

/// Strategy for whole-second UTC timestamps between 1970 and 2100
pub fn timestamp_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..4_102_444_800).prop_map(|secs| Utc.timestamp_opt(secs, 0).unwrap())
}

/// Strategy for floats, infinities included; NaN is left out since it never
/// compares equal to itself
pub fn float_strategy() -> impl Strategy<Value = f64> {
    prop_oneof![
        8 => -1.0e12f64..1.0e12f64,
        1 => Just(f64::INFINITY),
        1 => Just(f64::NEG_INFINITY),
    ]
}

/// Strategy for fully populated or partially empty order records
pub fn order_params_strategy() -> impl Strategy<Value = OrderParams> {
    (
        any::<String>(),
        any::<i64>(),
        any::<u32>(),
        float_strategy(),
        any::<bool>(),
        prop::option::of(timestamp_strategy()),
        prop::option::of(any::<String>()),
    )
        .prop_map(
            |(order_id, customer_id, quantity, unit_price, rush, requested_at, notes)| OrderParams {
                order_id,
                customer_id,
                quantity,
                unit_price,
                rush,
                requested_at,
                notes,
            },
        )
}
