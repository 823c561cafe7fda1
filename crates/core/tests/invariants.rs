//! Property-based tests for the irrigation controller.
//!
//! Drives controllers from random start times and humidity levels through
//! long minute-by-minute runs and checks the state invariants after every
//! tick.

use greenhouse_core::{ControllerConfig, IrrigationController, NullSink, SimTime};
use proptest::prelude::*;
use time::macros::datetime;
use time::Duration;

// ===========================================================================
// Generators
// ===========================================================================

/// A start time anywhere within the first two weeks of March 2025.
fn arb_start() -> impl Strategy<Value = SimTime> {
    (0i64..14 * 24 * 60).prop_map(|offset| datetime!(2025-03-01 00:00) + Duration::minutes(offset))
}

fn arb_config() -> impl Strategy<Value = ControllerConfig> {
    (0.0f64..=45.0, 0.0f64..3.0, 0.0f64..1.0).prop_map(|(initial, gain, decay)| {
        let mut cfg = ControllerConfig::default();
        cfg.humidity.initial_percent = initial;
        cfg.humidity.gain_per_minute = gain;
        cfg.humidity.decay_per_minute = decay;
        cfg
    })
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn state_invariants_hold_every_tick(
        cfg in arb_config(),
        start in arb_start(),
        minutes in 1usize..3000,
    ) {
        prop_assert!(cfg.validate().is_ok());
        let max = cfg.humidity.max_percent;
        let mut ctl = IrrigationController::new(cfg, NullSink);

        let mut now = start;
        let mut water = 0.0;
        let mut fertilizer = 0.0;
        for _ in 0..minutes {
            ctl.advance(now);

            let h = ctl.soil_humidity();
            prop_assert!((0.0..=max).contains(&h), "humidity {} out of [0, {}]", h, max);

            let d = ctl.devices();
            prop_assert_eq!(d.pump_on, d.valve_open);
            prop_assert_eq!(d.is_watering(), ctl.session().is_some());
            prop_assert!(!d.fertilizer_on || d.pump_on, "doser on while idle");

            prop_assert!(ctl.water_used_liters() >= water);
            prop_assert!(ctl.fertilizer_used_ml() >= fertilizer);
            water = ctl.water_used_liters();
            fertilizer = ctl.fertilizer_used_ml();

            now += Duration::minutes(1);
        }
    }

    #[test]
    fn one_record_per_interval(start in arb_start(), minutes in 1i64..2000) {
        let mut ctl = IrrigationController::new(ControllerConfig::default(), NullSink);
        let mut now = start;
        for _ in 0..minutes {
            ctl.advance(now);
            now += Duration::minutes(1);
        }

        let expected = (minutes + 9) / 10;
        prop_assert_eq!(ctl.observations().len() as i64, expected);
        for pair in ctl.observations().windows(2) {
            prop_assert_eq!(pair[1].at - pair[0].at, Duration::minutes(10));
        }
    }

    #[test]
    fn sessions_start_only_from_idle(start in arb_start()) {
        let mut ctl = IrrigationController::new(ControllerConfig::default(), NullSink);
        let mut now = start;
        let mut current = None;
        for _ in 0..(2 * 24 * 60) {
            ctl.advance(now);
            let session = ctl.session().copied();
            if let (Some(prev), Some(next)) = (current, session) {
                // A session never gets replaced in-flight.
                prop_assert_eq!(prev, next);
            }
            current = session;
            now += Duration::minutes(1);
        }
    }
}
