use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use calc_shell::error::{LangError, ShellError};
use calc_shell::namespace::Capabilities;
use calc_shell::{Interpreter, RewriteConfig, Value};
use pretty_assertions::assert_eq;

fn eval_fresh(src: &str) -> Value {
    let mut interp = Interpreter::new(Capabilities::Full);
    eval(&mut interp, src)
}

fn eval(interp: &mut Interpreter, src: &str) -> Value {
    interp
        .eval_source(src)
        .unwrap_or_else(|e| panic!("evaluation of {:?} failed: {}", src, e))
}

fn rational(num: i64, den: i64) -> Value {
    Value::rational(num, den).expect("rational")
}

#[cfg(test)]
mod exact_arithmetic_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn integer_division_is_exact() {
        assert_eq!(eval_fresh("1/2"), rational(1, 2));
        assert_eq!(eval_fresh("4/2"), Value::Int(2), "exact division reduces");
    }

    #[test]
    fn float_division_stays_float() {
        assert_eq!(eval_fresh("1.0/2"), Value::Float(0.5));
    }

    #[test]
    fn rationals_propagate_through_sums() {
        assert_eq!(eval_fresh("1/2 + 1/3"), rational(5, 6));
        assert_eq!(eval_fresh("1/3*3"), Value::Int(1));
    }

    #[test]
    fn decimal_literals_are_exact() {
        // 0.1 + 0.2 is exactly 3/10, not 0.30000000000000004
        assert_eq!(eval_fresh("0.1 + 0.2"), rational(3, 10));
    }

    #[test]
    fn provably_integer_subexpressions_divide_exactly() {
        let mut interp = Interpreter::new(Capabilities::Full);
        eval(&mut interp, "n = 3");
        assert_eq!(eval(&mut interp, "(n+1)/2"), Value::Int(2));
        assert_eq!(eval(&mut interp, "n/2"), rational(3, 2));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let mut interp = Interpreter::new(Capabilities::Full);
        let err = interp.eval_source("1/0").expect_err("1/0 must fail");
        assert!(matches!(
            err,
            ShellError::Lang(LangError::ZeroDivision)
        ));
    }

    #[test]
    fn evalf_approximates() {
        assert_eq!(eval_fresh("(1/2).evalf()"), Value::Float(0.5));
    }
}

#[cfg(test)]
mod matrix_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn tuple_of_tuples_becomes_a_matrix() {
        let v = eval_fresh("((1,0),(0,1))");
        assert!(
            matches!(v, Value::Matrix { rows: 2, cols: 2, .. }),
            "a rectangular tuple of tuples should construct a matrix, got {}",
            v
        );
    }

    #[test]
    fn identity_determinant() {
        assert_eq!(eval_fresh("((1,0),(0,1)).det()"), Value::Int(1));
        assert_eq!(eval_fresh("((1,2),(3,4)).det()"), Value::Int(-2));
    }

    #[test]
    fn determinant_stays_exact() {
        assert_eq!(eval_fresh("((1/2,0),(0,1/2)).det()"), rational(1, 4));
    }

    #[test]
    fn ragged_rows_fall_back_to_a_tuple() {
        let v = eval_fresh("((1,2),(3,4,5))");
        assert!(
            matches!(v, Value::Tuple(_)),
            "ragged rows must not build a matrix, got {}",
            v
        );
    }

    #[test]
    fn non_numeric_cells_fall_back_to_a_tuple() {
        let v = eval_fresh("((\"a\",\"b\"),(\"c\",\"d\"))");
        assert!(matches!(v, Value::Tuple(_)));
    }

    #[test]
    fn matrix_arithmetic() {
        assert_eq!(
            eval_fresh("((1,2),(3,4)) + ((1,1),(1,1))"),
            eval_fresh("((2,3),(4,5))")
        );
        assert_eq!(
            eval_fresh("2 * ((1,2),(3,4))"),
            eval_fresh("((2,4),(6,8))")
        );
    }
}

#[cfg(test)]
mod date_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date_interp() -> Interpreter {
        let cfg = RewriteConfig {
            auto_date: true,
            ..RewriteConfig::default()
        };
        Interpreter::with_config(Capabilities::Full, cfg)
    }

    #[test]
    fn date_difference_is_a_duration() {
        let mut interp = date_interp();
        assert_eq!(
            eval(&mut interp, "d\"2020-01-02\" - d\"2020-01-01\""),
            Value::Duration(86_400)
        );
    }

    #[test]
    fn duration_days() {
        let mut interp = date_interp();
        assert_eq!(
            eval(&mut interp, "(d\"2020-03-01\" - d\"2020-01-01\").days()"),
            Value::Int(60),
            "2020 is a leap year"
        );
    }

    #[test]
    fn relative_dates() {
        let mut interp = date_interp();
        assert_eq!(
            eval(&mut interp, "(d\"tomorrow\" - d\"today\").days()"),
            Value::Int(1)
        );
    }

    #[test]
    fn dates_compare() {
        let mut interp = date_interp();
        assert_eq!(
            eval(&mut interp, "d\"2020-01-01\" < d\"2021-01-01\""),
            Value::Bool(true)
        );
    }

    #[test]
    fn unparseable_date_is_an_error() {
        let mut interp = date_interp();
        assert!(interp.eval_source("d\"not a date\"").is_err());
    }
}

#[cfg(test)]
mod latex_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn frac_is_exact() {
        assert_eq!(eval_fresh("$\\frac{1}{2}$"), rational(1, 2));
        assert_eq!(eval_fresh("$\\frac{1}{2}$.evalf()"), Value::Float(0.5));
    }

    #[test]
    fn fragments_participate_in_arithmetic() {
        assert_eq!(eval_fresh("$\\frac{1}{2}$ + 1/2"), Value::Int(1));
    }

    #[test]
    fn free_symbols_bind_to_the_namespace() {
        let mut interp = Interpreter::new(Capabilities::Full);
        eval(&mut interp, "x = 4");
        assert_eq!(eval(&mut interp, "$x \\cdot x$"), Value::Int(16));
    }

    #[test]
    fn unbound_symbols_stay_symbolic() {
        assert!(matches!(eval_fresh("$y + 1$"), Value::Sym(_)));
    }

    #[test]
    fn sqrt_stays_symbolic_until_evalf() {
        let v = eval_fresh("$\\sqrt{2}$");
        assert!(matches!(v, Value::Sym(_)), "sqrt(2) has no exact form, got {}", v);
        let f = eval_fresh("$\\sqrt{2}$.evalf()");
        match f {
            Value::Float(x) => assert!((x - std::f64::consts::SQRT_2).abs() < 1e-12),
            other => panic!("expected a float approximation, got {}", other),
        }
    }
}

#[cfg(test)]
mod statement_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn assignment_and_augmented_assignment() {
        let mut interp = Interpreter::new(Capabilities::Full);
        eval(&mut interp, "a = 4");
        eval(&mut interp, "a += 1");
        assert_eq!(eval(&mut interp, "a"), Value::Int(5));
    }

    #[test]
    fn delete_unbinds() {
        let mut interp = Interpreter::new(Capabilities::Full);
        eval(&mut interp, "a = 4");
        assert_eq!(eval(&mut interp, "a + 0"), Value::Int(4));
        eval(&mut interp, "del a");
        // unbound again, so the auto-symbol rule takes over
        assert!(matches!(eval(&mut interp, "a + 0"), Value::Sym(_)));
    }

    #[test]
    fn delete_of_an_unbound_name_is_an_error() {
        let mut interp = Interpreter::new(Capabilities::Full);
        assert!(interp.eval_source("del neverbound").is_err());
    }

    #[test]
    fn multiple_statements_one_unit() {
        let mut interp = Interpreter::new(Capabilities::Full);
        assert_eq!(eval(&mut interp, "b = 2; b * 3"), Value::Int(6));
    }

    #[test]
    fn assignment_earlier_in_unit_counts_as_bound() {
        // `q` is multi-letter, so the implicit product only fires if the
        // in-unit assignment scan saw `qq = 7`
        let mut interp = Interpreter::new(Capabilities::Full);
        assert_eq!(eval(&mut interp, "qq = 7; 2qq"), Value::Int(14));
    }

    #[test]
    fn committed_errors_are_reported() {
        let mut interp = Interpreter::new(Capabilities::Full);
        let err = interp.eval_source("nosuchname").expect_err("must fail");
        assert!(matches!(err, ShellError::Lang(LangError::Name(_))));
    }
}

#[cfg(test)]
mod interrupt_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sleep_is_interruptible() {
        let mut interp = Interpreter::new(Capabilities::Full);
        let flag = interp.interrupt_flag();
        let setter = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            flag.store(true, Ordering::SeqCst);
        });

        let start = Instant::now();
        let err = interp
            .eval_source("sleep(30)")
            .expect_err("interrupted sleep must fail");
        setter.join().expect("setter thread");

        assert!(matches!(err, ShellError::Lang(LangError::Interrupted)));
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "the interrupt should cut the sleep short"
        );
    }
}

#[cfg(test)]
mod capability_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn restricted_namespace_never_contains_dangerous_builtins() {
        let interp = Interpreter::new(Capabilities::Restricted);
        for name in ["open_file", "run_command", "exit"] {
            assert!(
                !interp.ns.contains(name),
                "'{}' must not exist in a restricted namespace",
                name
            );
        }
    }

    #[test]
    fn restricted_session_cannot_open_files() {
        let mut interp = Interpreter::new(Capabilities::Restricted);
        assert!(
            interp.eval_source("open_file(\"/etc/hostname\")").is_err(),
            "open_file must be unavailable under restricted capabilities"
        );
    }

    #[test]
    fn full_session_can_open_files() {
        let dir = std::env::temp_dir().join("calc_shell_cap_test.txt");
        std::fs::write(&dir, "hello").expect("write temp file");
        let mut interp = Interpreter::new(Capabilities::Full);
        let src = format!("open_file(\"{}\")", dir.display());
        assert_eq!(eval(&mut interp, &src), Value::Str("hello".into()));
        let _ = std::fs::remove_file(&dir);
    }
}
