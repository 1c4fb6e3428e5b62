/// An entry in the error code registry.
pub struct ErrorEntry {
    pub code: &'static str,
    pub short: &'static str, // brief description for tooling
    pub long: &'static str,  // full explanation for --explain
}

/// All stable error codes for torqlang.
pub static REGISTRY: &[ErrorEntry] = &[
    // ── Lexer ────────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "TQ-L001",
        short: "unexpected character",
        long: r#"## TQ-L001: unexpected character

A character was encountered that does not start any torqlang token.

**Example:**

    var x = 1 ^ 2

`^` is not an operator. Remove it or use one of `+ - * / %`.
"#,
    },
    ErrorEntry {
        code: "TQ-L002",
        short: "identifier starts with '$'",
        long: r#"## TQ-L002: identifier starts with '$'

Identifiers beginning with `$` are reserved for names the compiler
generates (`$v0`, `$r`, `$m`, ...). They cannot appear in source.

**Example that triggers this:**

    var $tmp = 1

**Fix:**

    var tmp = 1
"#,
    },
    ErrorEntry {
        code: "TQ-L003",
        short: "unterminated string literal",
        long: r#"## TQ-L003: unterminated string literal

A string opened with `'` or `"` never closes on the same token.

**Example:**

    var s = 'hello

**Fix:**

    var s = 'hello'
"#,
    },
    ErrorEntry {
        code: "TQ-L004",
        short: "malformed numeric literal",
        long: r#"## TQ-L004: malformed numeric literal

A number is out of range for its type or has an invalid suffix.
Integer literals widen from Int32 to Int64 automatically; `L` forces
Int64, `f` Flt32, `m` Dec128.

**Example:**

    var n = 99999999999999999999L
"#,
    },
    // ── Parser ───────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "TQ-P001",
        short: "expected expression",
        long: r#"## TQ-P001: expected expression

The parser needed a value (literal, identifier, record, call, ...) but
found another token.

**Example:**

    var x = then
"#,
    },
    ErrorEntry {
        code: "TQ-P002",
        short: "expected expression, got end of input",
        long: r#"## TQ-P002: expected expression, got end of input

The source ended where a value was required.

**Example:**

    var x =
"#,
    },
    ErrorEntry {
        code: "TQ-P003",
        short: "unexpected token",
        long: r#"## TQ-P003: unexpected token

A specific token was required, such as `then`, `do`, `in` or `end`, and
something else was found.

**Example:**

    if x do y end

**Fix:**

    if x then y end
"#,
    },
    ErrorEntry {
        code: "TQ-P004",
        short: "unexpected end of input",
        long: r#"## TQ-P004: unexpected end of input

A construct was still open when the source ended. Every `if`, `case`,
`while`, `for`, `try`, `func`, `proc`, `actor`, `handle` and `begin`
closes with `end`.
"#,
    },
    ErrorEntry {
        code: "TQ-P005",
        short: "expected identifier",
        long: r#"## TQ-P005: expected identifier

A name was required, for example after `var`, `for`, or inside a
parameter list.

**Example:**

    func (1) in 1 end
"#,
    },
    ErrorEntry {
        code: "TQ-P006",
        short: "expected identifier, got end of input",
        long: r#"## TQ-P006: expected identifier, got end of input

The source ended where a name was required.
"#,
    },
    ErrorEntry {
        code: "TQ-P007",
        short: "invalid pattern",
        long: r#"## TQ-P007: invalid pattern

Patterns are literals, identifiers, `~name`, `_`, record patterns
`{f: p, ...}` and tuple patterns `[p, ...]`, optionally labeled with
`label#`.

**Example:**

    case x of f(y) then y end
"#,
    },
    ErrorEntry {
        code: "TQ-P008",
        short: "unexpected token at top level",
        long: r#"## TQ-P008: unexpected token at top level

A keyword that only continues an enclosing construct (`end`, `else`,
`of`, `catch`, ...) appeared where a new sentence was expected.
"#,
    },
    ErrorEntry {
        code: "TQ-P009",
        short: "case without clauses",
        long: r#"## TQ-P009: case without clauses

A `case` needs at least one `of pattern then ...` clause.
"#,
    },
    // ── Generator ────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "TQ-G001",
        short: "invalid pattern feature",
        long: r#"## TQ-G001: invalid pattern feature

Record pattern features must be feature literals (Bool, Int32, Int64,
Char, Str, null, eof) or escaped identifiers. Floats and decimals are
not features, and a plain identifier would bind rather than match.

**Example that triggers this:**

    case r of {1.5: y} then y end
"#,
    },
    ErrorEntry {
        code: "TQ-G002",
        short: "invalid pattern label",
        long: r#"## TQ-G002: invalid pattern label

A pattern label must be a literal or `~name`.

**Example that triggers this:**

    case t of l#[y] then y end

**Fix:**

    case t of ~l#[y] then y end
"#,
    },
    ErrorEntry {
        code: "TQ-G003",
        short: "break outside a loop",
        long: r#"## TQ-G003: break outside a loop

`break` may only appear inside `while` or `for`, and not inside a
function or proc defined within the loop.
"#,
    },
    ErrorEntry {
        code: "TQ-G004",
        short: "continue outside a loop",
        long: r#"## TQ-G004: continue outside a loop

`continue` may only appear inside `while` or `for`, and not inside a
function or proc defined within the loop.
"#,
    },
    ErrorEntry {
        code: "TQ-G005",
        short: "return outside a function",
        long: r#"## TQ-G005: return outside a function

`return` needs an enclosing `func` or `proc`. Actor bodies and handlers
cannot return.
"#,
    },
    ErrorEntry {
        code: "TQ-G006",
        short: "proc returns a value",
        long: r#"## TQ-G006: proc returns a value

A `proc` has no result, so `return` inside it takes no value. Use
`func` if the caller needs a value.
"#,
    },
    // ── Runtime ──────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "TQ-R001",
        short: "NotBoundError",
        long: r#"## TQ-R001: NotBoundError

A value was required but its variable was never bound, for example
`assert_bound(x)` on a fresh `var x`, or an ask handler that finished
without producing a result.
"#,
    },
    ErrorEntry {
        code: "TQ-R002",
        short: "AskNotHandledError",
        long: r#"## TQ-R002: AskNotHandledError

No `handle ask` clause of the actor matched the message. The error
record is sent back as the response; the actor keeps running.
"#,
    },
    ErrorEntry {
        code: "TQ-R003",
        short: "TellNotHandledError",
        long: r#"## TQ-R003: TellNotHandledError

No `handle tell` clause of the actor matched the message. The actor
halts.
"#,
    },
    ErrorEntry {
        code: "TQ-R004",
        short: "ArithmeticError",
        long: r#"## TQ-R004: ArithmeticError

Integer or decimal division by zero, or overflow. Floats follow IEEE 754
and never raise this.
"#,
    },
    ErrorEntry {
        code: "TQ-R005",
        short: "TypeError",
        long: r#"## TQ-R005: TypeError

An operation received a value of the wrong type, such as `1 + 'a'`, a
non-Bool `if` condition, or a float used as a record feature.
"#,
    },
    ErrorEntry {
        code: "TQ-R006",
        short: "UnificationError",
        long: r#"## TQ-R006: UnificationError

Two values could not be made equal: `var x = 1  x = 2`, or records with
different labels or features.
"#,
    },
    ErrorEntry {
        code: "TQ-R007",
        short: "ArityError",
        long: r#"## TQ-R007: ArityError

A proc was applied to the wrong number of arguments. Functions take one
extra hidden argument for their result.
"#,
    },
    ErrorEntry {
        code: "TQ-R008",
        short: "NotProcError",
        long: r#"## TQ-R008: NotProcError

A value that is not a proc was applied.
"#,
    },
    ErrorEntry {
        code: "TQ-R009",
        short: "FeatureNotFoundError",
        long: r#"## TQ-R009: FeatureNotFoundError

`r.f` or `r[f]` named a feature the record does not have, or an actor
was sent something other than `ask` or `tell`.
"#,
    },
    ErrorEntry {
        code: "TQ-R010",
        short: "IdentNotFoundError",
        long: r#"## TQ-R010: IdentNotFoundError

An identifier was used without a `var` declaration in scope.
"#,
    },
    ErrorEntry {
        code: "TQ-R011",
        short: "NotPortableError",
        long: r#"## TQ-R011: NotPortableError

Only complete values cross actors. Cells and unbound variables cannot
be sent as messages, responses or actor configuration arguments.
"#,
    },
    ErrorEntry {
        code: "TQ-R012",
        short: "StepLimitError",
        long: r#"## TQ-R012: StepLimitError

A run executed more statements than `machine.max_steps` allows. Raise
the limit in the config file or with TORQ_MAX_STEPS, or set it to 0.
"#,
    },
    ErrorEntry {
        code: "TQ-R013",
        short: "ActorStoppedError",
        long: r#"## TQ-R013: ActorStoppedError

A message was sent to an actor that has stopped, or an actor stopped
before answering a request.
"#,
    },
    ErrorEntry {
        code: "TQ-R014",
        short: "JumpError",
        long: r#"## TQ-R014: JumpError

A `$jump_throw` found no matching `$jump_catch`. This indicates a
compiler bug, not a user error.
"#,
    },
    ErrorEntry {
        code: "TQ-R015",
        short: "uncaught value",
        long: r#"## TQ-R015: uncaught value

A program threw a value that no `try` caught.

**Example:**

    throw 'oops'
"#,
    },
    // ── Config ───────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "TQ-C001",
        short: "cannot read config file",
        long: r#"## TQ-C001: cannot read config file

The file given to `--config` does not exist or is not readable.
"#,
    },
    ErrorEntry {
        code: "TQ-C002",
        short: "invalid config file",
        long: r#"## TQ-C002: invalid config file

The config file is not valid TOML or has unknown keys. Accepted:

    [machine]
    max_steps = 0

    [log]
    filter = "warn"
    json = false
"#,
    },
    ErrorEntry {
        code: "TQ-C003",
        short: "invalid environment override",
        long: r#"## TQ-C003: invalid environment override

TORQ_MAX_STEPS must be a non-negative integer.
"#,
    },
];

/// Look up an error entry by code (e.g. `"TQ-G003"`).
pub fn lookup(code: &str) -> Option<&'static ErrorEntry> {
    REGISTRY.iter().find(|e| e.code == code)
}

/// Code for a runtime error record's `name`; `None` is a thrown non-error value.
pub fn runtime_code(name: Option<&str>) -> &'static str {
    name.and_then(|name| {
        REGISTRY
            .iter()
            .find(|e| e.code.starts_with("TQ-R") && e.short == name)
            .map(|e| e.code)
    })
    .unwrap_or("TQ-R015")
}
