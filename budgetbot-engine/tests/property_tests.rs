//! Property-based tests for budgetbot-engine
//!
//! These tests use proptest to verify invariants across a wide range of inputs.

#[cfg(test)]
mod billing_properties {
    use budgetbot_engine::{generate_billing_dates, BillingPeriod};
    use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
    use chrono_tz::America::New_York;
    use proptest::prelude::*;

    fn period() -> impl Strategy<Value = BillingPeriod> {
        prop_oneof![
            Just(BillingPeriod::Weekly),
            Just(BillingPeriod::Monthly),
            Just(BillingPeriod::Yearly),
        ]
    }

    fn start() -> impl Strategy<Value = DateTime<Utc>> {
        // 1970 .. 2096
        (0i64..4_000_000_000i64).prop_map(|secs| Utc.timestamp_opt(secs, 0).unwrap())
    }

    proptest! {
        /// A known period always yields exactly `max_count` dates
        #[test]
        fn exact_count(period in period(), start in start(), count in 0usize..60) {
            let dates = generate_billing_dates(period, start, count);
            prop_assert_eq!(dates.len(), count);
        }

        /// The first date is the start itself
        #[test]
        fn first_is_start(period in period(), start in start(), count in 1usize..30) {
            let dates = generate_billing_dates(period, start, count);
            prop_assert_eq!(dates[0], start);
        }

        /// Dates are strictly increasing
        #[test]
        fn strictly_increasing(period in period(), start in start(), count in 2usize..40) {
            let dates = generate_billing_dates(period, start, count);
            for pair in dates.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }
        }

        /// Weekly dates are exactly seven days apart
        #[test]
        fn weekly_spacing(start in start(), count in 2usize..40) {
            let dates = generate_billing_dates(BillingPeriod::Weekly, start, count);
            for pair in dates.windows(2) {
                prop_assert_eq!(pair[1] - pair[0], chrono::Duration::days(7));
            }
        }

        /// Monthly dates keep the start's time of day and never pass its day
        /// of month; a shorter month clamps without drifting later months
        #[test]
        fn monthly_day_clamped_not_drifting(start in start(), count in 1usize..36) {
            let dates = generate_billing_dates(BillingPeriod::Monthly, start, count);
            for (i, date) in dates.iter().enumerate() {
                prop_assert_eq!(date.time(), start.time());
                prop_assert!(date.day() <= start.day());
                let months = start.year() * 12 + start.month0() as i32 + i as i32;
                prop_assert_eq!(date.year() * 12 + date.month0() as i32, months);
                if start.day() <= 28 {
                    prop_assert_eq!(date.day(), start.day());
                }
            }
            prop_assert_eq!(dates[0].hour(), start.hour());
        }

        /// Unknown periods never produce dates
        #[test]
        fn unknown_period_is_empty(start in start(), count in 0usize..60) {
            prop_assert!(generate_billing_dates(BillingPeriod::Unknown, start, count).is_empty());
        }

        /// A zone with DST transitions still yields every date, in order,
        /// starting at the start instant
        #[test]
        fn dst_zone_keeps_full_sequence(period in period(), start in start(), count in 1usize..40) {
            let start = start.with_timezone(&New_York);
            let dates = generate_billing_dates(period, start, count);
            prop_assert_eq!(dates.len(), count);
            prop_assert_eq!(dates[0], start);
            for pair in dates.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }
        }
    }
}

#[cfg(test)]
mod amount_properties {
    use budgetbot_engine::Amount;
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    fn cents(v: i64) -> Amount {
        Amount::new(Decimal::new(v, 2))
    }

    proptest! {
        /// Addition is commutative: a + b = b + a
        #[test]
        fn addition_commutative(a in -1_000_000i64..1_000_000i64, b in -1_000_000i64..1_000_000i64) {
            prop_assert_eq!(cents(a).checked_add(&cents(b)), cents(b).checked_add(&cents(a)));
        }

        /// Subtraction is the inverse of addition
        #[test]
        fn subtraction_inverts_addition(a in -1_000_000i64..1_000_000i64, b in -1_000_000i64..1_000_000i64) {
            let sum = cents(a).checked_add(&cents(b)).unwrap();
            prop_assert_eq!(sum.checked_sub(&cents(b)).unwrap(), cents(a));
        }

        /// Two-decimal text survives a parse/format trip
        #[test]
        fn fixed_text_round_trip(v in -100_000_000i64..100_000_000i64) {
            let text = cents(v).to_fixed();
            prop_assert_eq!(Amount::parse(&text).unwrap(), cents(v));
        }

        /// Ordering matches the underlying integers
        #[test]
        fn ordering_matches(a in -1_000_000i64..1_000_000i64, b in -1_000_000i64..1_000_000i64) {
            prop_assert_eq!(cents(a).is_greater_than(&cents(b)), a > b);
            prop_assert_eq!(cents(a).is_equal(&cents(b)), a == b);
        }
    }
}

#[cfg(test)]
mod ledger_properties {
    use budgetbot_engine::ledger::{apply, AmountChange, BalanceRefs, LedgerAction};
    use budgetbot_engine::{Amount, OperationType};
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    fn cents(v: i64) -> Amount {
        Amount::new(Decimal::new(v, 2))
    }

    fn single_kind() -> impl Strategy<Value = OperationType> {
        prop_oneof![Just(OperationType::Incoming), Just(OperationType::Spending)]
    }

    proptest! {
        /// Updating an operation to amount B lands where creating it with B
        /// would have
        #[test]
        fn update_equals_fresh_create(
            kind in single_kind(),
            start in -1_000_000i64..1_000_000i64,
            old in 1i64..100_000i64,
            new in 1i64..100_000i64,
        ) {
            let mut updated = cents(start);
            apply(LedgerAction::Create, kind, BalanceRefs::single(&mut updated), &AmountChange::new(cents(old)));
            apply(
                LedgerAction::Update,
                kind,
                BalanceRefs::single(&mut updated),
                &AmountChange::new(cents(new)).with_old_amount(cents(old)),
            );

            let mut fresh = cents(start);
            apply(LedgerAction::Create, kind, BalanceRefs::single(&mut fresh), &AmountChange::new(cents(new)));

            prop_assert_eq!(updated, fresh);
        }

        /// A same-currency transfer conserves the total of both balances
        #[test]
        fn plain_transfer_conserves_total(
            from in 0i64..1_000_000i64,
            to in 0i64..1_000_000i64,
            amount in 1i64..100_000i64,
        ) {
            let (mut a, mut b) = (cents(from), cents(to));
            let outcome = apply(
                LedgerAction::Create,
                OperationType::Transfer,
                BalanceRefs::transfer(&mut a, &mut b),
                &AmountChange::new(cents(amount)),
            );
            prop_assert!(outcome.is_applied());
            prop_assert_eq!(a.checked_add(&b).unwrap(), cents(from + to));
        }
    }
}
