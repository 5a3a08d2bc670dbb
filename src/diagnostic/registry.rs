/// An entry in the error code registry.
pub struct ErrorEntry {
    pub code: &'static str,
    pub short: &'static str,  // one line, for `phl explain --list`
    pub long: &'static str,   // full explanation for `phl explain CODE`
}

/// Every stable error code the toolchain reports.
pub static REGISTRY: &[ErrorEntry] = &[
    // ── Generation ───────────────────────────────────────────────────────────
    ErrorEntry {
        code: "PHL-G001",
        short: "break or continue outside of a loop",
        long: r#"## PHL-G001: break or continue outside of a loop

`break`, `continue`, `if_break` and `if_continue` jump to the exit or entry
of the innermost enclosing loop. Used at the top level there is nothing to
jump to.

**Example that triggers this:**

    {"body": [{"break": {}}]}

**Fix:** move the construct inside a `loop` body.
"#,
    },
    ErrorEntry {
        code: "PHL-G002",
        short: "no enclosing loop carries that label",
        long: r#"## PHL-G002: no enclosing loop carries that label

A labeled `break` or `continue` names a loop through the `label` construct
placed immediately before it. Either no enclosing loop was given that
label, or something was emitted between the label and the loop.

**Fix:**

    {"label": "outer"},
    {"loop": [ ... {"break": {"label": "outer"}} ... ]}
"#,
    },
    ErrorEntry {
        code: "PHL-G003",
        short: "system register used as a destination",
        long: r#"## PHL-G003: system register used as a destination

System registers (`RSLT`, `ENDKY`, `NUMBR`, `BRCOD`, `DATE*`, `TIME*`,
`BST*`, `HTID`) are written by the terminal only. Programs may read them but
never assign to them.

**Fix:** write to a `DAT`, `INT`, `FLT` or `USR` register.
"#,
    },
    ErrorEntry {
        code: "PHL-G004",
        short: "status register used as an assign source",
        long: r#"## PHL-G004: status register used as an assign source

`RSLT`, `BRCOD`, `NUMBR` and `ENDKY` only have a meaning directly after the
instruction that set them and cannot be copied with `assign`.

**Fix:** use `get_result` to copy the status into an integer register, or
test it directly with `if`.
"#,
    },
    ErrorEntry {
        code: "PHL-G005",
        short: "register has the wrong type",
        long: r#"## PHL-G005: register has the wrong type

The construct needs a register of a particular type: `switch` and
`no_echo_input` need an integer register, string operations need text
registers, `number_to_string` needs a numeric source, and barcode input
needs a `DAT` register.
"#,
    },
    ErrorEntry {
        code: "PHL-G006",
        short: "too many special keys",
        long: r#"## PHL-G006: too many special keys

An input instruction can end on at most 10 special keys.
"#,
    },
    ErrorEntry {
        code: "PHL-G007",
        short: "title or version too long",
        long: r#"## PHL-G007: title or version too long

The program title is at most 20 bytes and the version at most 5 bytes.
"#,
    },
    ErrorEntry {
        code: "PHL-G008",
        short: "menu without entries",
        long: r#"## PHL-G008: menu without entries

A `menu_loop` needs at least one entry to show.
"#,
    },
    ErrorEntry {
        code: "PHL-G009",
        short: "label placed more than once",
        long: r#"## PHL-G009: label placed more than once

A `label` construct names a position in the program, and labeled `break`
and `continue` find their loop by that name. Placing the same name twice
would leave those jumps with two candidate targets.

**Fix:** rename one of the labels.
"#,
    },
    // ── Internal ─────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "PHL-F001",
        short: "internal fault",
        long: r#"## PHL-F001: internal fault

The compiler or interpreter reached a state correct input never produces:
a label resolved twice, a register pool left unbalanced, a write to the
wrong register category, or a program counter past the last instruction.

A hand-edited or truncated program file can also cause this at run time.
Otherwise it is a bug in the toolchain.
"#,
    },
    // ── Codec ────────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "PHL-C001",
        short: "malformed program file",
        long: r#"## PHL-C001: malformed program file

A line of an encoded program could not be decoded. The reported line
number is 1-based and counts the title and label lines.

Each line starts with its own total length as three digits; a file that was
edited or transferred with changed line endings usually fails that check
first.
"#,
    },
    ErrorEntry {
        code: "PHL-C002",
        short: "value does not fit its field",
        long: r#"## PHL-C002: value does not fit its field

Every field of an encoded line has a fixed width. A number with more digits
than its field, or text containing a line break, cannot be written.

A text literal operand that reads as a register name, such as `"INT1"`, is
also rejected: the line format has no way to mark it as a literal, so it would
load back as the register.
"#,
    },
];

/// Look up an error entry by code (e.g. `"PHL-G001"`).
pub fn lookup(code: &str) -> Option<&'static ErrorEntry> {
    REGISTRY.iter().find(|e| e.code == code)
}
