//! GLSL declaration scanner.
//!
//! A deliberately shallow front end: it strips comments, runs the
//! preprocessor directives that affect a stage's interface (`#version`,
//! `#define`/`#undef`, `#if`/`#ifdef` groups, `#error`), checks delimiter
//! balance, and collects the top-level declarations a linker cares about -- stage inputs and outputs, uniforms,
//! interface blocks, struct definitions, and function names. Function bodies
//! are not type-checked.
//!
//! Diagnostics use the `ERROR: 0:<line>: <message>` shape most desktop
//! drivers emit, so they read naturally after
//! [`format_shader_error`](crate::source::format_shader_error).

use std::collections::{HashMap, HashSet};
use std::fmt;

/// GLSL versions accepted in a `#version` directive.
pub const KNOWN_VERSIONS: [u32; 17] = [
    100, 110, 120, 130, 140, 150, 300, 310, 320, 330, 400, 410, 420, 430, 440, 450, 460,
];

const QUALIFIERS: [&str; 14] = [
    "highp",
    "mediump",
    "lowp",
    "flat",
    "smooth",
    "noperspective",
    "centroid",
    "sample",
    "patch",
    "invariant",
    "precise",
    "readonly",
    "writeonly",
    "coherent",
];

/// One compiler diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: usize,
    pub message: String,
}

impl Diagnostic {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ERROR: 0:{}: {}", self.line, self.message)
    }
}

/// Size of an array declarator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArraySize {
    /// `name[]`, as used for geometry and tessellation inputs.
    Unsized,
    Sized(usize),
}

/// How a top-level variable is exposed to neighbouring stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    In,
    Out,
    /// Legacy `varying`: an output of a vertex stage, an input of a
    /// fragment stage.
    Varying,
    Uniform,
}

/// A member of a struct or interface block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ty: String,
    pub array: Option<ArraySize>,
}

/// A top-level interface declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    /// Variable name, or the instance name of an interface block (the block
    /// name when the block has no instance name).
    pub name: String,
    /// Type name; for interface blocks, the block name.
    pub ty: String,
    pub array: Option<ArraySize>,
    pub storage: Storage,
    /// Members when this is an interface block.
    pub block: Option<Vec<Field>>,
    pub line: usize,
}

impl Variable {
    pub fn is_builtin(&self) -> bool {
        self.name.starts_with("gl_") || self.ty.starts_with("gl_")
    }
}

/// `#version` directive contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub number: u32,
    pub profile: Option<String>,
}

/// Everything the scanner learned about one stage's source.
#[derive(Debug, Clone, Default)]
pub struct StageInterface {
    pub version: Option<Version>,
    pub variables: Vec<Variable>,
    pub structs: HashMap<String, Vec<Field>>,
    /// Names of every function defined (with a body) in the source.
    pub functions: Vec<String>,
    /// Number of times each identifier is used inside a function body.
    pub references: HashMap<String, usize>,
}

impl StageInterface {
    pub fn defines_main(&self) -> bool {
        self.functions.iter().any(|f| f == "main")
    }

    pub fn with_storage(&self, storage: Storage) -> impl Iterator<Item = &Variable> {
        self.variables.iter().filter(move |v| v.storage == storage)
    }

    /// A variable is referenced when a function body uses it.
    pub fn is_referenced(&self, name: &str) -> bool {
        self.references.get(name).is_some_and(|&n| n > 0)
    }
}

/// Scans `source`, returning its interface or the diagnostics that made it
/// fail to compile.
pub fn scan(source: &str) -> Result<StageInterface, Vec<Diagnostic>> {
    let stripped = strip_comments(source).map_err(|d| vec![d])?;
    let pre = preprocess(&stripped).map_err(|d| vec![d])?;
    let tokens = tokenize(&pre.code, &pre.defines)?;

    let mut iface = StageInterface {
        version: pre.version,
        ..StageInterface::default()
    };
    count_references(&tokens, &mut iface.references);

    let mut parser = Parser {
        tokens: &tokens,
        defines: &pre.defines,
        iface: &mut iface,
    };
    parser.top_level().map_err(|d| vec![d])?;

    Ok(iface)
}

/// Counts identifier uses inside function bodies. Member names after `.`
/// (struct fields, swizzles) are not counted.
fn count_references(tokens: &[Token], references: &mut HashMap<String, usize>) {
    let mut depth = 0usize;
    let mut in_body = false;
    let mut prev: Option<&Token> = None;

    for token in tokens {
        if token.is('{') {
            if depth == 0 {
                in_body = prev.is_some_and(|p| p.is(')'));
            }
            depth += 1;
        } else if token.is('}') {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                in_body = false;
            }
        } else if let Tok::Ident(name) = &token.tok {
            if in_body && !prev.is_some_and(|p| p.is('.')) {
                *references.entry(name.clone()).or_insert(0) += 1;
            }
        }
        prev = Some(token);
    }
}

/// Replaces comments with whitespace, keeping line breaks so diagnostics
/// point at the original lines.
fn strip_comments(source: &str) -> Result<String, Diagnostic> {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut line = 1;

    while let Some(c) = chars.next() {
        match c {
            '/' if chars.peek() == Some(&'/') => {
                while chars.peek().is_some_and(|&n| n != '\n') {
                    chars.next();
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let start = line;
                let mut closed = false;
                while let Some(n) = chars.next() {
                    if n == '\n' {
                        out.push('\n');
                        line += 1;
                    } else if n == '*' && chars.peek() == Some(&'/') {
                        chars.next();
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    return Err(Diagnostic::new(start, "unterminated comment"));
                }
                out.push(' ');
            }
            '\n' => {
                line += 1;
                out.push('\n');
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}

struct Preprocessed {
    version: Option<Version>,
    defines: HashMap<String, i64>,
    /// Code lines with their 1-based line numbers; directives removed.
    code: Vec<(usize, String)>,
}

/// One open `#if`/`#ifdef`/`#ifndef` group.
struct Conditional {
    /// Whether the enclosing group is being compiled.
    parent_active: bool,
    /// Whether some branch of this group has already been taken.
    taken: bool,
    active: bool,
    seen_else: bool,
    line: usize,
}

fn preprocess(source: &str) -> Result<Preprocessed, Diagnostic> {
    let mut version = None;
    let mut macros: HashSet<String> = HashSet::new();
    let mut defines = HashMap::new();
    let mut code = Vec::new();
    let mut conditionals: Vec<Conditional> = Vec::new();
    let mut seen_statement = false;

    for (idx, raw) in source.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim_start();
        let active = conditionals.last().map_or(true, |c| c.active);

        let Some(directive) = trimmed.strip_prefix('#') else {
            if active {
                if !trimmed.trim().is_empty() {
                    seen_statement = true;
                }
                code.push((line, raw.to_string()));
            }
            continue;
        };

        let directive = directive.trim_start();
        let mut words = directive.split_whitespace();
        let name = words.next().unwrap_or("");
        let rest = directive.get(name.len()..).unwrap_or("");

        match name {
            "ifdef" | "ifndef" => {
                let macro_name = words.next().ok_or_else(|| {
                    Diagnostic::new(line, format!("#{name} requires a macro name"))
                })?;
                let defined = macros.contains(macro_name);
                let cond = active && (defined == (name == "ifdef"));
                conditionals.push(Conditional {
                    parent_active: active,
                    taken: cond,
                    active: cond,
                    seen_else: false,
                    line,
                });
            }
            "if" => {
                let cond = active && eval_condition(rest, &macros, &defines, line)? != 0;
                conditionals.push(Conditional {
                    parent_active: active,
                    taken: cond,
                    active: cond,
                    seen_else: false,
                    line,
                });
            }
            "elif" => {
                let top = conditionals
                    .last_mut()
                    .ok_or_else(|| Diagnostic::new(line, "#elif without #if"))?;
                if top.seen_else {
                    return Err(Diagnostic::new(line, "#elif after #else"));
                }
                if top.parent_active && !top.taken {
                    let cond = eval_condition(rest, &macros, &defines, line)? != 0;
                    top.active = cond;
                    top.taken = cond;
                } else {
                    top.active = false;
                }
            }
            "else" => {
                let top = conditionals
                    .last_mut()
                    .ok_or_else(|| Diagnostic::new(line, "#else without #if"))?;
                if top.seen_else {
                    return Err(Diagnostic::new(line, "#else after #else"));
                }
                top.active = top.parent_active && !top.taken;
                top.taken = true;
                top.seen_else = true;
            }
            "endif" => {
                conditionals
                    .pop()
                    .ok_or_else(|| Diagnostic::new(line, "#endif without #if"))?;
            }
            _ if !active => continue,
            "version" => {
                if seen_statement || version.is_some() {
                    return Err(Diagnostic::new(
                        line,
                        "#version must occur before any other statement in the program",
                    ));
                }
                let number = words
                    .next()
                    .and_then(|w| w.parse::<u32>().ok())
                    .ok_or_else(|| Diagnostic::new(line, "#version requires a version number"))?;
                if !KNOWN_VERSIONS.contains(&number) {
                    return Err(Diagnostic::new(
                        line,
                        format!("version '{number}' is not supported"),
                    ));
                }
                let profile = words.next().map(str::to_string);
                if let Some(p) = profile.as_deref() {
                    if !matches!(p, "core" | "compatibility" | "es") {
                        return Err(Diagnostic::new(line, format!("invalid profile '{p}'")));
                    }
                }
                version = Some(Version { number, profile });
            }
            "define" => {
                if let Some(macro_name) = words.next() {
                    // Function-like macros are recorded by name only.
                    let macro_name = macro_name.split('(').next().unwrap_or(macro_name);
                    macros.insert(macro_name.to_string());
                    match words.next().and_then(|v| v.parse::<i64>().ok()) {
                        Some(v) => defines.insert(macro_name.to_string(), v),
                        None => defines.remove(macro_name),
                    };
                }
            }
            "undef" => {
                if let Some(macro_name) = words.next() {
                    macros.remove(macro_name);
                    defines.remove(macro_name);
                }
            }
            "error" => {
                let message = words.collect::<Vec<_>>().join(" ");
                return Err(Diagnostic::new(line, format!("#error {message}")));
            }
            // #extension, #pragma, #line do not change the interface.
            _ => {}
        }
        seen_statement = true;
    }

    if let Some(open) = conditionals.last() {
        return Err(Diagnostic::new(open.line, "missing #endif"));
    }

    Ok(Preprocessed {
        version,
        defines,
        code,
    })
}

#[derive(Debug, Clone, PartialEq)]
enum CondTok {
    Num(i64),
    Ident(String),
    Op(&'static str),
}

const COND_OPS: [&str; 17] = [
    "&&", "||", "==", "!=", "<=", ">=", "(", ")", "!", "-", "+", "*", "/", "%", "<", ">", "~",
];

/// Evaluates the integer expression of an `#if` or `#elif`.
fn eval_condition(
    expr: &str,
    macros: &HashSet<String>,
    defines: &HashMap<String, i64>,
    line: usize,
) -> Result<i64, Diagnostic> {
    let invalid = || Diagnostic::new(line, "invalid preprocessor expression");
    let mut tokens = Vec::new();
    let mut rest = expr.trim_start();

    while let Some(c) = rest.chars().next() {
        if c.is_ascii_digit() {
            let end = rest
                .find(|ch: char| !ch.is_ascii_alphanumeric())
                .unwrap_or(rest.len());
            let literal = rest[..end].trim_end_matches(|ch: char| ch == 'u' || ch == 'U');
            let value = match literal.strip_prefix("0x").or_else(|| literal.strip_prefix("0X")) {
                Some(hex) => i64::from_str_radix(hex, 16),
                None => literal.parse::<i64>(),
            }
            .map_err(|_| invalid())?;
            tokens.push(CondTok::Num(value));
            rest = &rest[end..];
        } else if c.is_ascii_alphabetic() || c == '_' {
            let end = rest
                .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
                .unwrap_or(rest.len());
            tokens.push(CondTok::Ident(rest[..end].to_string()));
            rest = &rest[end..];
        } else {
            let op = COND_OPS
                .iter()
                .find(|op| rest.starts_with(**op))
                .ok_or_else(invalid)?;
            tokens.push(CondTok::Op(*op));
            rest = &rest[op.len()..];
        }
        rest = rest.trim_start();
    }

    if tokens.is_empty() {
        return Err(Diagnostic::new(line, "#if with no expression"));
    }

    let mut eval = CondEval {
        tokens: &tokens,
        pos: 0,
        macros,
        defines,
        line,
    };
    let value = eval.binary(0)?;
    if eval.pos != tokens.len() {
        return Err(invalid());
    }
    Ok(value)
}

/// Binary operators of `#if` expressions, loosest binding first.
const COND_LEVELS: [&[&str]; 6] = [
    &["||"],
    &["&&"],
    &["==", "!="],
    &["<", ">", "<=", ">="],
    &["+", "-"],
    &["*", "/", "%"],
];

struct CondEval<'a> {
    tokens: &'a [CondTok],
    pos: usize,
    macros: &'a HashSet<String>,
    defines: &'a HashMap<String, i64>,
    line: usize,
}

impl CondEval<'_> {
    fn error(&self, message: &str) -> Diagnostic {
        Diagnostic::new(self.line, message)
    }

    fn peek_op(&self) -> Option<&'static str> {
        match self.tokens.get(self.pos) {
            Some(CondTok::Op(op)) => Some(*op),
            _ => None,
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<(), Diagnostic> {
        if self.peek_op() == Some(op) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error("invalid preprocessor expression"))
        }
    }

    fn binary(&mut self, level: usize) -> Result<i64, Diagnostic> {
        let Some(ops) = COND_LEVELS.get(level) else {
            return self.unary();
        };
        let mut lhs = self.binary(level + 1)?;
        while let Some(op) = self.peek_op().filter(|op| ops.contains(op)) {
            self.pos += 1;
            let rhs = self.binary(level + 1)?;
            lhs = match op {
                "||" => i64::from(lhs != 0 || rhs != 0),
                "&&" => i64::from(lhs != 0 && rhs != 0),
                "==" => i64::from(lhs == rhs),
                "!=" => i64::from(lhs != rhs),
                "<" => i64::from(lhs < rhs),
                ">" => i64::from(lhs > rhs),
                "<=" => i64::from(lhs <= rhs),
                ">=" => i64::from(lhs >= rhs),
                "+" => lhs.wrapping_add(rhs),
                "-" => lhs.wrapping_sub(rhs),
                "*" => lhs.wrapping_mul(rhs),
                "/" | "%" if rhs == 0 => {
                    return Err(self.error("division by zero in preprocessor expression"))
                }
                "/" => lhs.wrapping_div(rhs),
                _ => lhs.wrapping_rem(rhs),
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<i64, Diagnostic> {
        match self.peek_op() {
            Some(op @ ("!" | "-" | "+" | "~")) => {
                self.pos += 1;
                let v = self.unary()?;
                Ok(match op {
                    "!" => i64::from(v == 0),
                    "-" => v.wrapping_neg(),
                    "~" => !v,
                    _ => v,
                })
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<i64, Diagnostic> {
        let tokens = self.tokens;
        let token = tokens
            .get(self.pos)
            .ok_or_else(|| self.error("unexpected end of preprocessor expression"))?;
        self.pos += 1;
        match token {
            CondTok::Num(v) => Ok(*v),
            CondTok::Ident(name) if name == "defined" => {
                let parenthesized = self.peek_op() == Some("(");
                if parenthesized {
                    self.pos += 1;
                }
                let Some(CondTok::Ident(macro_name)) = self.tokens.get(self.pos) else {
                    return Err(self.error("operator \"defined\" requires an identifier"));
                };
                self.pos += 1;
                if parenthesized {
                    self.expect_op(")")?;
                }
                Ok(i64::from(self.macros.contains(macro_name)))
            }
            // Undefined names evaluate to 0, as in C.
            CondTok::Ident(name) => Ok(self.defines.get(name).copied().unwrap_or(0)),
            CondTok::Op("(") => {
                let v = self.binary(0)?;
                self.expect_op(")")?;
                Ok(v)
            }
            CondTok::Op(_) => Err(self.error("invalid preprocessor expression")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Number(String),
    Punct(char),
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    line: usize,
}

impl Token {
    fn is(&self, c: char) -> bool {
        self.tok == Tok::Punct(c)
    }

    fn ident(&self) -> Option<&str> {
        match &self.tok {
            Tok::Ident(s) => Some(s),
            _ => None,
        }
    }
}

fn tokenize(
    code: &[(usize, String)],
    defines: &HashMap<String, i64>,
) -> Result<Vec<Token>, Vec<Diagnostic>> {
    let mut tokens = Vec::new();
    let mut open: Vec<(char, usize)> = Vec::new();
    let mut diagnostics = Vec::new();

    for (line, text) in code {
        let line = *line;
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            if c.is_whitespace() {
                continue;
            }
            if c.is_ascii_alphabetic() || c == '_' {
                let mut ident = String::from(c);
                while let Some(&n) = chars.peek() {
                    if n.is_ascii_alphanumeric() || n == '_' {
                        ident.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                // Integer #defines are substituted so array sizes resolve.
                let tok = match defines.get(&ident) {
                    Some(value) => Tok::Number(value.to_string()),
                    None => Tok::Ident(ident),
                };
                tokens.push(Token { tok, line });
                continue;
            }
            if c.is_ascii_digit() {
                let mut number = String::from(c);
                while let Some(&n) = chars.peek() {
                    if n.is_ascii_alphanumeric() || n == '.' {
                        number.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token {
                    tok: Tok::Number(number),
                    line,
                });
                continue;
            }

            match c {
                '(' | '[' | '{' => open.push((c, line)),
                ')' | ']' | '}' => {
                    let expected = match c {
                        ')' => '(',
                        ']' => '[',
                        _ => '{',
                    };
                    match open.pop() {
                        Some((o, _)) if o == expected => {}
                        _ => {
                            diagnostics.push(Diagnostic::new(
                                line,
                                format!("syntax error, unexpected '{c}'"),
                            ));
                            return Err(diagnostics);
                        }
                    }
                }
                _ => {}
            }
            tokens.push(Token {
                tok: Tok::Punct(c),
                line,
            });
        }
    }

    if let Some((c, line)) = open.pop() {
        diagnostics.push(Diagnostic::new(
            line,
            format!("syntax error, unexpected end of file, unclosed '{c}'"),
        ));
        return Err(diagnostics);
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    defines: &'a HashMap<String, i64>,
    iface: &'a mut StageInterface,
}

impl Parser<'_> {
    fn top_level(&mut self) -> Result<(), Diagnostic> {
        let tokens = self.tokens;
        let mut i = 0;
        let mut start = 0;

        while i < tokens.len() {
            if tokens[i].is(';') {
                self.declaration(&tokens[start..i])?;
                i += 1;
                start = i;
            } else if tokens[i].is('{') {
                let close = matching_brace(tokens, i);
                let head = &tokens[start..i];
                let body = &tokens[i + 1..close];

                if let Some(name) = struct_name(head) {
                    let fields = self.fields(body)?;
                    self.iface.structs.insert(name.to_string(), fields);
                    // `struct S { ... } s;` declarators are not interface-relevant.
                    i = skip_past_semicolon(tokens, close + 1);
                } else if let Some(storage) = block_storage(head) {
                    let end = find_semicolon(tokens, close + 1).ok_or_else(|| {
                        Diagnostic::new(tokens[close].line, "syntax error, expected ';' after block")
                    })?;
                    self.block(head, storage, body, &tokens[close + 1..end])?;
                    i = end + 1;
                } else {
                    self.function(head)?;
                    i = close + 1;
                }
                start = i;
            } else {
                i += 1;
            }
        }

        if start < tokens.len() {
            let line = tokens[tokens.len() - 1].line;
            return Err(Diagnostic::new(line, "syntax error, unexpected end of file, expected ';'"));
        }

        Ok(())
    }

    fn function(&mut self, head: &[Token]) -> Result<(), Diagnostic> {
        let paren = head.iter().position(|t| t.is('('));
        match paren.and_then(|p| p.checked_sub(1)).and_then(|p| head[p].ident()) {
            Some(name) if head.last().is_some_and(|t| t.is(')')) => {
                self.iface.functions.push(name.to_string());
                Ok(())
            }
            _ => {
                let line = head.first().map_or(1, |t| t.line);
                Err(Diagnostic::new(line, "syntax error, unexpected '{'"))
            }
        }
    }

    fn declaration(&mut self, stmt: &[Token]) -> Result<(), Diagnostic> {
        let mut j = skip_layout_and_qualifiers(stmt, 0);
        let storage = match stmt.get(j).and_then(Token::ident) {
            Some("in") | Some("attribute") => Storage::In,
            Some("out") => Storage::Out,
            Some("varying") => Storage::Varying,
            Some("uniform") => Storage::Uniform,
            // Globals, constants, precision statements and prototypes.
            _ => return Ok(()),
        };
        j = skip_layout_and_qualifiers(stmt, j + 1);

        // `layout(triangles) in;` style stage-wide declarations.
        if j >= stmt.len() {
            return Ok(());
        }

        let line = stmt[0].line;
        let ty = stmt[j]
            .ident()
            .ok_or_else(|| Diagnostic::new(line, "syntax error, expected a type"))?
            .to_string();

        for (name, array) in self.declarators(&stmt[j + 1..], line)? {
            self.iface.variables.push(Variable {
                name,
                ty: ty.clone(),
                array,
                storage,
                block: None,
                line,
            });
        }
        Ok(())
    }

    fn block(
        &mut self,
        head: &[Token],
        storage: Storage,
        body: &[Token],
        tail: &[Token],
    ) -> Result<(), Diagnostic> {
        let line = head.first().map_or(1, |t| t.line);
        let block_name = head
            .last()
            .and_then(Token::ident)
            .ok_or_else(|| Diagnostic::new(line, "syntax error, expected block name"))?
            .to_string();
        let fields = self.fields(body)?;

        let (name, array) = if tail.is_empty() {
            (block_name.clone(), None)
        } else {
            self.declarators(tail, line)?
                .into_iter()
                .next()
                .unwrap_or((block_name.clone(), None))
        };

        self.iface.variables.push(Variable {
            name,
            ty: block_name,
            array,
            storage,
            block: Some(fields),
            line,
        });
        Ok(())
    }

    /// Parses `type a, b[2];` member lists of structs and blocks.
    fn fields(&self, body: &[Token]) -> Result<Vec<Field>, Diagnostic> {
        let mut fields = Vec::new();
        for stmt in body.split(|t| t.is(';')).filter(|s| !s.is_empty()) {
            let line = stmt[0].line;
            let j = skip_layout_and_qualifiers(stmt, 0);
            let ty = stmt
                .get(j)
                .and_then(Token::ident)
                .ok_or_else(|| Diagnostic::new(line, "syntax error, expected member type"))?;
            for (name, array) in self.declarators(&stmt[j + 1..], line)? {
                fields.push(Field {
                    name,
                    ty: ty.to_string(),
                    array,
                });
            }
        }
        Ok(fields)
    }

    /// Parses `a, b[N], c = init` after a type.
    fn declarators(
        &self,
        toks: &[Token],
        line: usize,
    ) -> Result<Vec<(String, Option<ArraySize>)>, Diagnostic> {
        let mut out = Vec::new();
        let mut k = 0;

        loop {
            let name = toks
                .get(k)
                .and_then(Token::ident)
                .ok_or_else(|| Diagnostic::new(line, "syntax error, expected identifier"))?;
            k += 1;

            let mut array = None;
            if toks.get(k).is_some_and(|t| t.is('[')) {
                let (size, next) = self.array_size(toks, k + 1, line)?;
                array = Some(size);
                k = next;
            }

            if toks.get(k).is_some_and(|t| t.is('=')) {
                let mut depth = 0usize;
                while let Some(t) = toks.get(k) {
                    match &t.tok {
                        Tok::Punct('(' | '[' | '{') => depth += 1,
                        Tok::Punct(')' | ']' | '}') => depth = depth.saturating_sub(1),
                        Tok::Punct(',') if depth == 0 => break,
                        _ => {}
                    }
                    k += 1;
                }
            }

            out.push((name.to_string(), array));

            match toks.get(k) {
                None => return Ok(out),
                Some(t) if t.is(',') => k += 1,
                Some(t) => {
                    return Err(Diagnostic::new(t.line, "syntax error, unexpected token"));
                }
            }
        }
    }

    /// Parses the inside of `[...]` starting after the `[`; returns the size
    /// and the index after the `]`.
    fn array_size(
        &self,
        toks: &[Token],
        k: usize,
        line: usize,
    ) -> Result<(ArraySize, usize), Diagnostic> {
        match toks.get(k).map(|t| &t.tok) {
            Some(Tok::Punct(']')) => Ok((ArraySize::Unsized, k + 1)),
            Some(Tok::Number(n)) if toks.get(k + 1).is_some_and(|t| t.is(']')) => {
                let size = parse_int(n).ok_or_else(|| {
                    Diagnostic::new(line, format!("array size '{n}' is not an integer"))
                })?;
                Ok((ArraySize::Sized(size), k + 2))
            }
            Some(Tok::Ident(name)) if !self.defines.contains_key(name) => Err(Diagnostic::new(
                line,
                format!("'{name}' : undeclared identifier in array size"),
            )),
            _ => Err(Diagnostic::new(
                line,
                "array size must be a constant integer expression",
            )),
        }
    }
}

fn parse_int(n: &str) -> Option<usize> {
    let trimmed = n.trim_end_matches(|c: char| c == 'u' || c == 'U');
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        usize::from_str_radix(hex, 16).ok()
    } else {
        trimmed.parse().ok()
    }
}

fn skip_layout_and_qualifiers(toks: &[Token], mut j: usize) -> usize {
    loop {
        match toks.get(j).and_then(Token::ident) {
            Some("layout") if toks.get(j + 1).is_some_and(|t| t.is('(')) => {
                j = toks[j + 1..]
                    .iter()
                    .position(|t| t.is(')'))
                    .map_or(toks.len(), |p| j + 1 + p + 1);
            }
            Some(q) if QUALIFIERS.contains(&q) => j += 1,
            _ => return j,
        }
    }
}

fn struct_name(head: &[Token]) -> Option<&str> {
    match head {
        [.., kw, name] if kw.ident() == Some("struct") => name.ident(),
        _ => None,
    }
}

fn block_storage(head: &[Token]) -> Option<Storage> {
    let j = skip_layout_and_qualifiers(head, 0);
    let storage = match head.get(j).and_then(Token::ident)? {
        "in" => Storage::In,
        "out" => Storage::Out,
        "uniform" => Storage::Uniform,
        _ => return None,
    };
    let j = skip_layout_and_qualifiers(head, j + 1);
    (j + 1 == head.len() && head[j].ident().is_some()).then_some(storage)
}

fn matching_brace(tokens: &[Token], open: usize) -> usize {
    let mut depth = 0usize;
    for (k, t) in tokens.iter().enumerate().skip(open) {
        if t.is('{') {
            depth += 1;
        } else if t.is('}') {
            depth -= 1;
            if depth == 0 {
                return k;
            }
        }
    }
    // Unreachable after tokenize() has verified balance.
    tokens.len() - 1
}

fn find_semicolon(tokens: &[Token], from: usize) -> Option<usize> {
    tokens
        .iter()
        .skip(from)
        .position(|t| t.is(';'))
        .map(|p| from + p)
}

fn skip_past_semicolon(tokens: &[Token], from: usize) -> usize {
    find_semicolon(tokens, from).map_or(tokens.len(), |p| p + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(src: &str) -> StageInterface {
        match scan(src) {
            Ok(iface) => iface,
            Err(d) => panic!("expected scan to succeed, got {d:?}"),
        }
    }

    fn err(src: &str) -> Diagnostic {
        match scan(src) {
            Ok(_) => panic!("expected scan to fail:\n{src}"),
            Err(mut d) => d.remove(0),
        }
    }

    fn var<'a>(iface: &'a StageInterface, name: &str) -> &'a Variable {
        iface
            .variables
            .iter()
            .find(|v| v.name == name)
            .unwrap_or_else(|| panic!("no variable {name} in {:?}", iface.variables))
    }

    #[test]
    fn minimal_vertex_shader() {
        let iface = ok("#version 330 core\nvoid main(){gl_Position=vec4(0);}");
        assert_eq!(
            iface.version,
            Some(Version {
                number: 330,
                profile: Some("core".into())
            })
        );
        assert!(iface.defines_main());
        assert!(iface.variables.is_empty());
    }

    #[test]
    fn collects_inputs_outputs_and_uniforms() {
        let iface = ok(r#"#version 330 core
layout (location = 0) in vec3 aPos;
layout (location = 1) in vec3 aNormal;
out vec3 FragPos;
flat out int id;
uniform mat4 model, view;
uniform mat4 projection;
void main() {
    FragPos = vec3(model * vec4(aPos, 1.0));
    gl_Position = projection * view * vec4(FragPos, 1.0);
}
"#);
        assert_eq!(var(&iface, "aPos").storage, Storage::In);
        assert_eq!(var(&iface, "aNormal").ty, "vec3");
        assert_eq!(var(&iface, "FragPos").storage, Storage::Out);
        assert_eq!(var(&iface, "id").ty, "int");
        assert_eq!(iface.with_storage(Storage::Uniform).count(), 3);
        assert_eq!(var(&iface, "view").line, 6);
    }

    #[test]
    fn references_exclude_declaration_only_uniforms() {
        let iface = ok(r#"#version 330 core
uniform float used;
uniform float unused;
out vec4 c;
void main() { c = vec4(used); }
"#);
        assert!(iface.is_referenced("used"));
        assert!(!iface.is_referenced("unused"));
    }

    #[test]
    fn member_access_does_not_reference_same_named_uniform() {
        let iface = ok(r#"#version 330 core
struct Material { vec3 specular; float shininess; };
uniform Material material;
uniform float shininess;
out vec4 c;
void main() { c = vec4(material.specular * material.shininess, 1.0); }
"#);
        assert!(iface.is_referenced("material"));
        assert!(!iface.is_referenced("shininess"));
    }

    fn uniform_type(iface: &StageInterface, name: &str) -> Option<String> {
        iface
            .with_storage(Storage::Uniform)
            .find(|v| v.name == name)
            .map(|v| v.ty.clone())
    }

    #[test]
    fn ifdef_keeps_only_the_taken_branch() {
        let body = "#ifdef USE_RGBA\nuniform vec4 tint;\n#else\nuniform vec3 tint;\n#endif\nvoid main() {}";
        let with = ok(&format!("#version 330 core\n#define USE_RGBA\n{body}"));
        let without = ok(&format!("#version 330 core\n{body}"));

        assert_eq!(uniform_type(&with, "tint").as_deref(), Some("vec4"));
        assert_eq!(uniform_type(&without, "tint").as_deref(), Some("vec3"));
        assert_eq!(with.with_storage(Storage::Uniform).count(), 1);
    }

    #[test]
    fn ifndef_and_undef() {
        let iface = ok("#version 330 core\n#define A\n#undef A\n#ifndef A\nuniform float a;\n#endif\nvoid main() {}");
        assert!(uniform_type(&iface, "a").is_some());
    }

    #[test]
    fn if_elif_evaluates_integer_expressions() {
        let src = |lights: u32| {
            format!(
                "#version 330 core\n#define LIGHTS {lights}\n#if LIGHTS > 4 && defined(LIGHTS)\nuniform vec3 many[LIGHTS];\n#elif LIGHTS == 0 || !defined LIGHTS\nuniform float none;\n#else\nuniform vec3 few[LIGHTS];\n#endif\nvoid main() {{}}"
            )
        };
        assert!(uniform_type(&ok(&src(8)), "many").is_some());
        assert!(uniform_type(&ok(&src(0)), "none").is_some());
        let few = ok(&src(2));
        assert_eq!(var(&few, "few").array, Some(ArraySize::Sized(2)));
        assert_eq!(few.with_storage(Storage::Uniform).count(), 1);
    }

    #[test]
    fn nested_groups_inside_inactive_branch_stay_inactive() {
        let iface = ok("#version 330 core\n#if 0\n#ifdef X\n#else\nuniform float hidden;\n#error never\n#endif\n#endif\nvoid main() {}");
        assert_eq!(iface.with_storage(Storage::Uniform).count(), 0);
    }

    #[test]
    fn unbalanced_conditionals_fail() {
        assert!(err("#version 330 core\n#ifdef X\nvoid main() {}").message.contains("#endif"));
        assert!(err("#version 330 core\n#endif\nvoid main() {}").message.contains("without #if"));
        let d = err("#version 330 core\n#if 1 / 0\n#endif\nvoid main() {}");
        assert!(d.message.contains("division by zero"), "{d}");
    }

    #[test]
    fn comments_are_ignored_but_keep_line_numbers() {
        let iface = ok("#version 330 core\n/* uniform float a;\n*/\n// uniform float b;\nuniform float c;\nvoid main(){}");
        assert_eq!(iface.variables.len(), 1);
        assert_eq!(var(&iface, "c").line, 5);
    }

    #[test]
    fn struct_and_define_sized_arrays() {
        let iface = ok(r#"#version 330 core
#define NR_POINT_LIGHTS 4
struct PointLight {
    vec3 position;
    float constant, linear;
};
uniform PointLight pointLights[NR_POINT_LIGHTS];
void main() {}
"#);
        let lights = var(&iface, "pointLights");
        assert_eq!(lights.ty, "PointLight");
        assert_eq!(lights.array, Some(ArraySize::Sized(4)));
        let fields = &iface.structs["PointLight"];
        let names: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["position", "constant", "linear"]);
    }

    #[test]
    fn interface_blocks_and_unsized_arrays() {
        let iface = ok(r#"#version 330 core
layout (triangles) in;
layout (line_strip, max_vertices = 6) out;
in VS_OUT {
    vec3 normal;
} gs_in[];
void main() {}
"#);
        let block = var(&iface, "gs_in");
        assert_eq!(block.ty, "VS_OUT");
        assert_eq!(block.array, Some(ArraySize::Unsized));
        assert_eq!(block.block.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn legacy_qualifiers_are_recognised() {
        let iface = ok("#version 120\nattribute vec3 pos;\nvarying vec2 uv;\nvoid main(){}");
        assert_eq!(var(&iface, "pos").storage, Storage::In);
        assert_eq!(var(&iface, "uv").storage, Storage::Varying);
    }

    #[test]
    fn uniform_initializers_are_skipped() {
        let iface = ok("#version 330 core\nuniform vec3 tint = vec3(1.0, 0.5, 0.0), other;\nvoid main(){}");
        assert!(iface.variables.iter().any(|v| v.name == "other"));
    }

    #[test]
    fn precision_and_const_globals_are_not_interface() {
        let iface = ok("#version 300 es\nprecision mediump float;\nconst float PI = 3.14;\nvoid main(){}");
        assert!(iface.variables.is_empty());
    }

    #[test]
    fn unclosed_brace_fails() {
        let d = err("#version 330 core\nvoid main() {\n gl_Position = vec4(0.0);\n");
        assert_eq!(d.line, 2);
        assert!(d.message.contains("unclosed"), "{d}");
    }

    #[test]
    fn mismatched_delimiter_fails() {
        let d = err("#version 330 core\nvoid main() { vec4 x = vec4(1.0]; }");
        assert!(d.message.contains("unexpected ']'"), "{d}");
    }

    #[test]
    fn version_after_code_fails() {
        let d = err("uniform float t;\n#version 330 core\nvoid main(){}");
        assert_eq!(d.line, 2);
    }

    #[test]
    fn unknown_version_fails() {
        let d = err("#version 999\nvoid main(){}");
        assert!(d.message.contains("999"), "{d}");
    }

    #[test]
    fn error_directive_fails() {
        let d = err("#version 330 core\n#error lights not configured\nvoid main(){}");
        assert!(d.message.contains("lights not configured"), "{d}");
    }

    #[test]
    fn missing_semicolon_at_end_fails() {
        let d = err("#version 330 core\nuniform float t");
        assert_eq!(d.line, 2);
    }

    #[test]
    fn unterminated_comment_fails() {
        let d = err("#version 330 core\n/* never closed\nvoid main(){}");
        assert!(d.message.contains("comment"), "{d}");
    }

    #[test]
    fn diagnostic_display_matches_driver_shape() {
        let d = Diagnostic::new(7, "syntax error");
        assert_eq!(d.to_string(), "ERROR: 0:7: syntax error");
    }
}
