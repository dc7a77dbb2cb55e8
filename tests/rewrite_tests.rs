use calc_shell::namespace::Capabilities;
use calc_shell::{Interpreter, RewriteConfig, Value};
use pretty_assertions::assert_eq;

// Helper: evaluate one input in a fresh full-capability session
fn eval_fresh(src: &str) -> Value {
    let mut interp = Interpreter::new(Capabilities::Full);
    eval(&mut interp, src)
}

fn eval(interp: &mut Interpreter, src: &str) -> Value {
    interp
        .eval_source(src)
        .unwrap_or_else(|e| panic!("evaluation of {:?} failed: {}", src, e))
}

#[cfg(test)]
mod implicit_product_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn number_adjacent_to_parens() {
        assert_eq!(eval_fresh("2(1+1)"), Value::Int(4), "2(1+1) should multiply");
        assert_eq!(eval_fresh("(1+1)2"), Value::Int(4), "(1+1)2 should multiply");
    }

    #[test]
    fn adjacent_paren_groups_multiply() {
        assert_eq!(eval_fresh("(1+2)(3+4)"), Value::Int(21));
    }

    #[test]
    fn engineering_notation_times_variable() {
        let mut interp = Interpreter::new(Capabilities::Full);
        eval(&mut interp, "var = 3");
        assert_eq!(
            eval(&mut interp, "2e2var"),
            Value::Int(600),
            "2e2var should read as 2e2 * var"
        );
    }

    #[test]
    fn hex_literal_times_variable() {
        let mut interp = Interpreter::new(Capabilities::Full);
        eval(&mut interp, "var = 3");
        assert_eq!(eval(&mut interp, "0x10var"), Value::Int(48));
    }

    #[test]
    fn exponent_notation_is_not_a_product() {
        // `e-4` must stay an exponent, not become `e * (-4)`
        assert_eq!(
            eval_fresh("2e-4"),
            Value::rational(1, 5000).expect("rational"),
            "2e-4 should be the exact value 1/5000"
        );
    }

    #[test]
    fn unbound_plain_name_is_left_alone() {
        let mut interp = Interpreter::new(Capabilities::Full);
        assert!(
            interp.eval_source("2something").is_err(),
            "2something with unbound non-symbol name should not evaluate"
        );
    }

    #[test]
    fn unit_prefix_binds_tighter_than_power() {
        assert_eq!(eval_fresh("4k"), Value::Int(4_000));
        assert_eq!(
            eval_fresh("4k**2"),
            Value::Int(16_000_000),
            "4k**2 should square the prefixed quantity"
        );
    }

    #[test]
    fn sub_unit_prefixes_are_exact() {
        assert_eq!(
            eval_fresh("4m"),
            Value::rational(1, 250).expect("rational"),
            "4m is exactly 4/1000"
        );
        assert_eq!(eval_fresh("3u"), Value::rational(3, 1_000_000).expect("rational"));
        assert_eq!(eval_fresh("7n"), Value::rational(7, 1_000_000_000).expect("rational"));
        assert_eq!(eval_fresh("2p"), Value::rational(1, 500_000_000_000).expect("rational"));
    }

    #[test]
    fn milli_and_mega_are_distinct_prefixes() {
        assert_eq!(eval_fresh("2M"), Value::Int(2_000_000));
        assert_eq!(
            eval_fresh("2m"),
            Value::rational(1, 500).expect("rational"),
            "case distinguishes milli from mega"
        );
    }

    #[test]
    fn number_times_auto_symbol() {
        let v = eval_fresh("2x");
        assert!(
            matches!(v, Value::Sym(_)),
            "2x with unbound x should produce a symbolic product, got {}",
            v
        );
    }
}

#[cfg(test)]
mod factorial_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn bare_factorial() {
        assert_eq!(eval_fresh("5!"), Value::Int(120));
    }

    #[test]
    fn factorial_binds_tighter_than_addition() {
        assert_eq!(eval_fresh("5!+1"), Value::Int(121));
        assert_eq!(eval_fresh("3!*2"), Value::Int(12));
    }

    #[test]
    fn not_equal_operator_survives() {
        assert_eq!(
            eval_fresh("5!=6"),
            Value::Bool(true),
            "`!=` must not be read as a factorial"
        );
        assert_eq!(eval_fresh("5! == 120"), Value::Bool(true));
    }

    #[test]
    fn factorial_inside_string_is_untouched() {
        assert_eq!(eval_fresh("\"5!\""), Value::Str("5!".to_string()));
    }
}

#[cfg(test)]
mod caret_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn caret_interp() -> Interpreter {
        let cfg = RewriteConfig {
            caret_power: true,
            ..RewriteConfig::default()
        };
        Interpreter::with_config(Capabilities::Full, cfg)
    }

    #[test]
    fn caret_is_power_when_enabled() {
        assert_eq!(eval(&mut caret_interp(), "2^3"), Value::Int(8));
        assert_eq!(
            eval(&mut caret_interp(), "2^-1"),
            Value::rational(1, 2).expect("rational")
        );
    }

    #[test]
    fn caret_is_an_error_when_disabled() {
        let mut interp = Interpreter::new(Capabilities::Full);
        assert!(interp.eval_source("2^3").is_err());
    }

    #[test]
    fn caret_inside_string_is_untouched() {
        assert_eq!(eval(&mut caret_interp(), "\"a^b\""), Value::Str("a^b".into()));
    }
}

#[cfg(test)]
mod unicode_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn multiplication_dot() {
        assert_eq!(eval_fresh("2⋅3"), Value::Int(6));
    }

    #[test]
    fn superscript_digits_are_powers() {
        assert_eq!(eval_fresh("3²"), Value::Int(9));
        assert_eq!(eval_fresh("2¹²"), Value::Int(4096), "a superscript run is one exponent");
        assert_eq!(
            eval_fresh("2⁻¹"),
            Value::rational(1, 2).expect("rational"),
            "superscript minus negates the exponent"
        );
    }
}

#[cfg(test)]
mod lambda_shorthand_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn define_and_call() {
        let mut interp = Interpreter::new(Capabilities::Full);
        eval(&mut interp, "f(x,y) := x+y");
        assert_eq!(eval(&mut interp, "f(1,2)"), Value::Int(3));
    }

    #[test]
    fn reserved_name_cannot_be_redefined() {
        let mut interp = Interpreter::new(Capabilities::Full);
        let err = interp
            .eval_source("Matrix(x) := x")
            .expect_err("redefining Matrix must fail");
        assert!(
            err.to_string().contains("reserved"),
            "error should mention the reserved name, got: {}",
            err
        );
    }

    #[test]
    fn lambda_closes_over_parameters_not_globals() {
        let mut interp = Interpreter::new(Capabilities::Full);
        eval(&mut interp, "x = 100");
        eval(&mut interp, "g(x) := x*2");
        assert_eq!(eval(&mut interp, "g(3)"), Value::Int(6));
        assert_eq!(eval(&mut interp, "x"), Value::Int(100), "global x unchanged");
    }
}

#[cfg(test)]
mod permutation_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn single_cycle() {
        assert_eq!(eval_fresh("(0 1)"), Value::Permutation(vec![1, 0]));
        assert_eq!(eval_fresh("(0 2 1)"), Value::Permutation(vec![2, 0, 1]));
    }

    #[test]
    fn adjacent_cycles_compose() {
        // left permutation applied after the right one
        assert_eq!(eval_fresh("(0 1)(1 2)"), Value::Permutation(vec![1, 2, 0]));
    }

    #[test]
    fn oversized_cycle_elements_are_rejected() {
        let mut interp = Interpreter::new(Capabilities::Full);
        assert!(
            interp.eval_source("(0 1000000000000)").is_err(),
            "a huge cycle element must be a domain error, not an allocation"
        );
    }

    #[test]
    fn tuple_of_numbers_is_not_a_cycle() {
        assert_eq!(
            eval_fresh("(1, 2)"),
            Value::Tuple(vec![Value::Int(1), Value::Int(2)]),
            "comma tuples must not be read as cycles"
        );
    }
}

#[cfg(test)]
mod literal_masking_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn strings_pass_through_every_rewrite() {
        assert_eq!(eval_fresh("\"2(1+1) 5! x^2\""), Value::Str("2(1+1) 5! x^2".into()));
    }

    #[test]
    fn repeated_identical_literals_share_a_mask() {
        assert_eq!(eval_fresh("\"ab\" + \"ab\""), Value::Str("abab".into()));
    }

    #[test]
    fn template_interpolations_get_the_full_pipeline() {
        assert_eq!(
            eval_fresh("f\"v={5!+1}\""),
            Value::Str("v=121".into()),
            "shorthand inside an interpolation should be rewritten"
        );
    }

    #[test]
    fn interpolated_strings_may_contain_braces() {
        assert_eq!(
            eval_fresh("f\"v={'}'}\""),
            Value::Str("v=}".into()),
            "a brace inside a nested string must not end the interpolation"
        );
        assert_eq!(
            eval_fresh("f\"{'{' + '}'}\""),
            Value::Str("{}".into())
        );
    }

    #[test]
    fn template_braces_escape() {
        assert_eq!(eval_fresh("f\"{{literal}}\""), Value::Str("{literal}".into()));
    }

    #[test]
    fn date_literals_require_the_rewrite() {
        let mut interp = Interpreter::new(Capabilities::Full);
        assert!(
            interp.eval_source("d\"2020-01-01\"").is_err(),
            "date literal without auto_date should be rejected"
        );
    }
}

#[cfg(test)]
mod auto_symbol_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn single_letters_become_symbols() {
        let mut interp = Interpreter::new(Capabilities::Full);
        let v = eval(&mut interp, "x + 1");
        assert!(matches!(v, Value::Sym(_)), "x + 1 should stay symbolic");
        assert!(
            interp.ns.contains("x"),
            "the auto-symbol binding should be committed"
        );
    }

    #[test]
    fn suffixed_and_greek_names_qualify() {
        assert!(matches!(eval_fresh("y_1 + 1"), Value::Sym(_)));
        assert!(matches!(eval_fresh("z2 + 1"), Value::Sym(_)));
        assert!(matches!(eval_fresh("alpha + 1"), Value::Sym(_)));
    }

    #[test]
    fn multi_letter_names_do_not_qualify() {
        let mut interp = Interpreter::new(Capabilities::Full);
        assert!(
            interp.eval_source("foo + 1").is_err(),
            "a plain unbound word must stay a name error"
        );
    }

    #[test]
    fn bound_names_are_left_alone() {
        let mut interp = Interpreter::new(Capabilities::Full);
        eval(&mut interp, "x = 41");
        assert_eq!(eval(&mut interp, "x + 1"), Value::Int(42));
    }
}
