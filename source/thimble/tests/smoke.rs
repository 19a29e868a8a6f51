use thimble::testutil::blocking_runtest;

#[test]
fn arithmetic_and_printing() {
    blocking_runtest(
        r#"
        > 2 3 + .
        < 5.
        > 10 3 mod . 10 3 / .
        < 1. 3.
        > -7 .
        < -7.
        "#,
    );
}

#[test]
fn colon_definitions() {
    blocking_runtest(
        r#"
        > : double dup + ;
        > 5 double .
        < 10.
        > : quad double double ;
        > 5 quad .
        < 20.
        "#,
    );
}

#[test]
fn conditionals() {
    blocking_runtest(
        r#"
        > : abs dup 0 < if -1 * then ;
        > -7 abs . 7 abs .
        < 7. 7.
        > : min 2dup > if swap then drop ;
        > 3 9 min . 9 3 min .
        < 3. 3.
        "#,
    );
}

#[test]
fn counted_loops() {
    blocking_runtest(
        r#"
        > : count 0 do i . loop ;
        > 5 count
        < 0. 1. 2. 3. 4.
        > : sum 0 swap 0 do i + loop ;
        > 10 sum .
        < 45.
        "#,
    );
}

#[test]
fn question_do_and_leave() {
    blocking_runtest(
        r#"
        > : maybe 0 ?do i . loop ;
        > 0 maybe
        > 3 maybe
        < 0. 1. 2.
        > : first 10 0 do i dup . 2 = if leave then loop ;
        > first
        < 0. 1. 2.
        "#,
    );
}

#[test]
fn plus_loop() {
    blocking_runtest(
        r#"
        > : evens 10 0 do i . 2 +loop ;
        > evens
        < 0. 2. 4. 6. 8.
        "#,
    );
}

#[test]
fn shadowing_and_words() {
    blocking_runtest(
        r#"
        > : greet 72 emit 105 emit ;
        > greet
        < Hi
        > : greet 33 emit ;
        > greet
        < !
        > words
        "#,
    );
}

#[test]
fn self_extension_with_comma() {
    blocking_runtest(
        r#"
        ( tick the next input token and compile it, at compile time )
        > : inline' ' , ; immediate
        > : double inline' dup inline' + ;
        > 21 double .
        < 42.
        "#,
    );
}

#[test]
fn errors_are_fatal_and_reported() {
    blocking_runtest(
        r#"
        x frobnicate
        x +
        x 1 0 /
        x if
        x : broken 1 if ;
        ( the vm is reset between failing lines, so this still works )
        > 2 2 + .
        < 4.
        "#,
    );
}
