use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread,
};

use llpar::{CancellationFlag, CollectingErrorListener};

use crate::{calc_defs, parse_calc};

const INPUTS: [&str; 6] = [
    "a = 1 + 2 * 3;",
    "(a + b) * c; d = e;",
    "x = 1 2;\ny = 3;",
    "a = ((1);",
    "1 * 2 * 3 + 4 * 5 + 6;",
    "q = r = s;",
];

#[test]
fn threads_share_caches() {
    let (lexdef, pdef) = calc_defs();
    let expected = {
        let (l, p) = calc_defs();
        INPUTS
            .iter()
            .map(|i| parse_calc(&l, &p, i))
            .collect::<Vec<_>>()
    };
    thread::scope(|s| {
        let handles = (0..4)
            .map(|n| {
                let (lexdef, pdef) = (lexdef.clone(), pdef.clone());
                s.spawn(move || {
                    // Each thread starts at a different input so that DFA states are built in
                    // different orders.
                    (0..INPUTS.len() * 3)
                        .map(|i| {
                            let j = (i + n) % INPUTS.len();
                            (j, parse_calc(&lexdef, &pdef, INPUTS[j]))
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect::<Vec<_>>();
        for h in handles {
            for (j, o) in h.join().unwrap() {
                assert_eq!(o, expected[j]);
            }
        }
    });
    assert!(pdef.simulator().dfas().iter().any(|d| !d.is_empty()));
}

#[test]
fn caches_cleared_during_parses() {
    let (lexdef, pdef) = calc_defs();
    let expected = INPUTS
        .iter()
        .map(|i| parse_calc(&lexdef, &pdef, i))
        .collect::<Vec<_>>();
    let done = AtomicBool::new(false);
    thread::scope(|s| {
        let parsers = (0..2)
            .map(|_| {
                s.spawn(|| {
                    let mut n = 0;
                    while !done.load(Ordering::Relaxed) || n < INPUTS.len() {
                        let j = n % INPUTS.len();
                        assert_eq!(parse_calc(&lexdef, &pdef, INPUTS[j]), expected[j]);
                        n += 1;
                    }
                })
            })
            .collect::<Vec<_>>();
        for _ in 0..500 {
            pdef.clear_dfa();
            lexdef.clear_dfa();
            thread::yield_now();
        }
        done.store(true, Ordering::Relaxed);
        for p in parsers {
            p.join().unwrap();
        }
    });
}

#[test]
fn cancelled_parse_stops() {
    let (lexdef, pdef) = calc_defs();
    let flag = CancellationFlag::new();
    let canceller = flag.clone();
    thread::spawn(move || canceller.cancel()).join().unwrap();

    let errs = CollectingErrorListener::new();
    let mut parser = pdef.parser(lexdef.lexer("a = 1;"));
    parser.core_mut().remove_error_listeners();
    parser.core_mut().add_error_listener(Box::new(errs.clone()));
    parser.core_mut().set_cancellation_flag(flag.clone());
    let e = parser.parse(pdef.rule_idx("prog").unwrap()).unwrap_err();
    assert!(e.is_cancelled());
    assert!(errs.is_empty());

    // Once reset, the flag lets parses run again.
    flag.reset();
    let mut parser = pdef.parser(lexdef.lexer("a = 1;"));
    parser.core_mut().set_cancellation_flag(flag);
    assert!(parser.parse(pdef.rule_idx("prog").unwrap()).is_ok());
}
