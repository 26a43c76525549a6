//! Whole-program transcripts: every top-level result on its own line, and a
//! fatal error ending the output with its report line.

use arenascheme::arena::Arena;
use arenascheme::evaluator::{self, create_root_frame};
use arenascheme::scheme::read_program;
use arenascheme::{Error, Interpreter};
use pretty_assertions::assert_eq;

fn transcript(source: &str) -> (i32, String) {
    let mut interpreter = Interpreter::new().unwrap_or_else(|e| panic!("{e}"));
    let mut out = Vec::new();
    let status = interpreter.run_reporting(source, &mut out);
    (status, String::from_utf8_lossy(&out).into_owned())
}

fn assert_transcript(source: &str, expected_status: i32, expected_output: &str) {
    let (status, output) = transcript(source);
    assert_eq!(output, expected_output);
    assert_eq!(status, expected_status, "exit status for:\n{source}");
}

#[test]
fn recursion() {
    assert_transcript(
        "
        ; factorial and fibonacci
        (define fact (lambda (n) (if (= n 0) 1 (* n (fact (- n 1))))))
        (fact 5)
        (fact 20)
        (define fib (lambda (n) (if (< n 2) n (+ (fib (- n 1)) (fib (- n 2))))))
        (fib 15)
        ",
        0,
        "\n120\n2432902008176640000\n\n610\n",
    );
}

#[test]
fn list_processing() {
    assert_transcript(
        "
        (define append
          (lambda (a b) (if (null? a) b (cons (car a) (append (cdr a) b)))))
        (append '(1 2) '(3 4))
        (define reverse
          (lambda (l)
            (letrec ((loop (lambda (l acc)
                             (if (null? l) acc (loop (cdr l) (cons (car l) acc))))))
              (loop l '()))))
        (reverse '(1 2 3))
        (define map
          (lambda (f l) (if (null? l) '() (cons (f (car l)) (map f (cdr l))))))
        (map (lambda (x) (* x x)) '(1 2 3 4))
        (cons '(1) 2)
        (cdr '(a))
        ",
        0,
        "\n(1 2 3 4)\n\n(3 2 1)\n\n(1 4 9 16)\n((1) . 2)\n()\n",
    );
}

#[test]
fn closures_share_mutable_state() {
    assert_transcript(
        r#"
        (define make-account
          (lambda (balance)
            (lambda (amount)
              (if (> amount balance)
                  "Insufficient funds"
                  (begin (set! balance (- balance amount)) balance)))))
        (define acc (make-account 100))
        (acc 30)
        (acc 50)
        (acc 40)
        "#,
        0,
        "\n\n70\n20\n\"Insufficient funds\"\n",
    );
}

#[test]
fn conditionals_and_inexact_numbers() {
    assert_transcript(
        "
        (define classify
          (lambda (n) (cond ((< n 0) 'negative) ((= n 0) 'zero) (else 'positive))))
        (classify -5) (classify 0) (classify 3)
        (let* ((x 1.5) (y (* x 2))) y)
        (/ 7 2)
        (and (< 1 2) (> 3 2))
        ",
        0,
        "\nnegative\nzero\npositive\n3.000000\n3.500000\n#t\n",
    );
}

#[test]
fn output_before_an_error_is_kept() {
    assert_transcript(
        "(define x 1)\nx\n(car x)\nx\n",
        1,
        "\n1\nEvaluation error: Type error: car requires a pair, got integer\n",
    );
    assert_transcript(
        "(set! y 1)",
        1,
        "Evaluation error: Cannot set! unbound variable: y\n",
    );
    assert_transcript(
        "(letrec ((a 1) (b (+ a 1))) b)",
        1,
        "Evaluation error: Unbound variable: a\n",
    );
}

#[test]
fn syntax_errors_stop_everything() {
    let (status, output) = transcript("(define x 1)\nx\n(display \"hi)");
    assert_eq!(status, 1);
    assert!(
        output.starts_with("Syntax error: Unterminated string literal"),
        "unexpected output: {output}"
    );
    assert_eq!(output.lines().count(), 1);

    assert_transcript(
        "(+ 1 2))",
        1,
        "Syntax error: Unexpected ')' with no matching '('\n",
    );
}

#[test]
fn failed_program_arena_releases_to_zero() {
    let mut arena = Arena::new();
    let root = create_root_frame(&mut arena).unwrap_or_else(|e| panic!("{e}"));
    let forms = read_program("(define x '(1 2 3)) (car (cdr (cdr (cdr x))))", &mut arena)
        .unwrap_or_else(|e| panic!("parse failed: {e}"));
    let [define_form, failing_form] = arena
        .list_array::<2>(forms)
        .unwrap_or_else(|| panic!("expected two forms"));

    evaluator::eval(define_form, root, &mut arena).unwrap_or_else(|e| panic!("{e}"));
    let result = evaluator::eval(failing_form, root, &mut arena);
    assert!(matches!(result, Err(Error::TypeError(_))), "got {result:?}");
    assert!(arena.stats().total() > 0);

    arena.release_all();
    assert_eq!(arena.stats().total(), 0);
}
