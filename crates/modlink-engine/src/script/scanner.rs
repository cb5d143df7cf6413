//! Declaration scanner
//!
//! Default [`ScriptParser`]. It extracts import and export declarations from
//! script source and builds a small interpretable body out of the statements
//! it understands:
//!
//! - `const` / `let` / `var` declarations
//! - `function` declarations, function expressions and arrow functions
//! - `export` of declarations, `export default`, `export { a as b }`
//! - `if` / `else` and `throw`
//! - member access, calls, `new`, `+` / `-` / `!`, object literals,
//!   template literals, assignments
//! - `import.meta` and `import(specifier, options)`
//!
//! TypeScript `type` / `interface` declarations, `import type` and type
//! annotations are erased. Anything else (loops, `try`, classes, re-exports,
//! `await`, other operators) is a syntax error.

use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

use super::interp::{BinaryOp, Expr, FunctionBody, FunctionDef, Program, ScannedBody, Stmt};
use super::lexer::{tokenize, unescape, Spanned, Token};
use super::{ImportBinding, ImportEntry, ScriptModule, ScriptParser};
use crate::error::ParseError;
use crate::module::{Attributes, CanonicalKey};
use crate::value::Value;

/// Scanner-based script parser
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclarationScanner;

impl DeclarationScanner {
    pub fn new() -> Self {
        Self
    }

    /// Scan source text into a script module
    pub fn scan(&self, source: &str) -> Result<ScriptModule, ParseError> {
        let tokens = tokenize(source)?;
        Parser::new(tokens).parse_module()
    }
}

impl ScriptParser for DeclarationScanner {
    fn parse(&self, _module: &CanonicalKey, text: &str) -> Result<ScriptModule, ParseError> {
        self.scan(text)
    }
}

type PResult<T> = Result<T, ParseError>;

/// Statement keywords the interpreter has no form for
const UNSUPPORTED_STATEMENTS: &[&str] = &[
    "for", "while", "do", "switch", "try", "break", "continue", "with", "debugger",
];

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    /// Nesting depth of function bodies being parsed
    function_depth: usize,

    imports: Vec<ImportEntry>,
    import_locals: FxHashSet<Arc<str>>,
    exports: Vec<Arc<str>>,
    /// `export { local as exported }` entries, checked once all declarations are known
    export_lists: Vec<(Arc<str>, Arc<str>, usize)>,
    declared: FxHashSet<Arc<str>>,
    aliases: FxHashMap<Arc<str>, Vec<Arc<str>>>,
    stmts: Vec<Stmt>,
}

impl Parser {
    fn new(tokens: Vec<Spanned>) -> Self {
        Self {
            tokens,
            pos: 0,
            function_depth: 0,
            imports: Vec::new(),
            import_locals: FxHashSet::default(),
            exports: Vec::new(),
            export_lists: Vec::new(),
            declared: FxHashSet::default(),
            aliases: FxHashMap::default(),
            stmts: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------

    fn peek(&self) -> Option<&Token> {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|s| &s.token)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|s| s.line)
            .unwrap_or(1)
    }

    /// Whether the current token starts a new line
    fn on_new_line(&self) -> bool {
        match (self.pos.checked_sub(1).and_then(|i| self.tokens.get(i)), self.tokens.get(self.pos)) {
            (Some(prev), Some(current)) => current.line > prev.line,
            _ => false,
        }
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == Some(token)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.line())
    }

    fn expect(&mut self, token: &Token, what: &str) -> PResult<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(format!("expected {}", what)))
        }
    }

    fn expect_identifier(&mut self) -> PResult<Arc<str>> {
        match self.peek().and_then(Token::identifier) {
            Some(name) => {
                let name = Arc::from(name);
                self.pos += 1;
                Ok(name)
            }
            None => Err(self.error("expected identifier")),
        }
    }

    /// Identifier or keyword (property, export and attribute names)
    fn expect_name(&mut self) -> PResult<Arc<str>> {
        match self.peek() {
            Some(Token::Str(s)) => {
                let name = Arc::from(s.as_str());
                self.pos += 1;
                Ok(name)
            }
            Some(token) => match token.name() {
                Some(name) => {
                    let name = Arc::from(name);
                    self.pos += 1;
                    Ok(name)
                }
                None => Err(self.error("expected name")),
            },
            None => Err(self.error("expected name")),
        }
    }

    fn expect_string(&mut self) -> PResult<String> {
        match self.peek() {
            Some(Token::Str(s)) => {
                let s = s.clone();
                self.pos += 1;
                Ok(s)
            }
            _ => Err(self.error("expected string literal")),
        }
    }

    fn end_statement(&mut self) -> PResult<()> {
        if self.eat(&Token::Semicolon) || self.at_end() || self.on_new_line() {
            return Ok(());
        }
        match self.peek() {
            Some(Token::RightBrace) => Ok(()),
            Some(Token::Operator(op)) => Err(self.error(format!("unsupported operator '{}'", op))),
            Some(Token::Star) | Some(Token::Slash) => Err(self.error("unsupported operator")),
            _ => Err(self.error("expected ';'")),
        }
    }

    /// Skip a `type` / `interface` declaration
    fn skip_type_declaration(&mut self) -> PResult<()> {
        let start = self.pos;
        let mut depth = 0usize;

        while let Some(token) = self.peek() {
            if depth == 0 && self.pos > start && self.on_new_line() && !self.continues_previous() {
                break;
            }
            match token {
                Token::LeftBrace | Token::LeftParen | Token::LeftBracket => depth += 1,
                Token::RightBrace | Token::RightParen | Token::RightBracket => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                }
                Token::Semicolon if depth == 0 => {
                    self.pos += 1;
                    break;
                }
                _ => {}
            }
            self.pos += 1;
        }

        if self.pos == start {
            return Err(self.error("unexpected token"));
        }
        Ok(())
    }

    /// Whether the previous token cannot end a statement
    fn continues_previous(&self) -> bool {
        let prev = self.pos.checked_sub(1).and_then(|i| self.tokens.get(i));
        matches!(
            prev.map(|s| &s.token),
            Some(
                Token::Eq
                    | Token::Operator(_)
                    | Token::Plus
                    | Token::Minus
                    | Token::Star
                    | Token::Slash
                    | Token::Comma
                    | Token::Dot
                    | Token::Colon
                    | Token::Arrow
            )
        )
    }

    /// Skip a type annotation up to one of `stops` at nesting depth zero
    fn skip_type(&mut self, stops: &[Token]) {
        let start = self.pos;
        let mut depth = 0usize;
        let mut angle = 0usize;

        while let Some(token) = self.peek() {
            if depth == 0 && angle == 0 {
                if stops.contains(token) {
                    break;
                }
                if self.pos > start && self.on_new_line() && !self.continues_previous() {
                    break;
                }
            }
            match token {
                Token::LeftBrace | Token::LeftParen | Token::LeftBracket => depth += 1,
                Token::RightBrace | Token::RightParen | Token::RightBracket => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                }
                Token::Operator(op) => {
                    angle += op.matches('<').count();
                    angle = angle.saturating_sub(op.matches('>').count());
                }
                _ => {}
            }
            self.pos += 1;
        }
    }

    // ------------------------------------------------------------------
    // Module level
    // ------------------------------------------------------------------

    fn parse_module(mut self) -> PResult<ScriptModule> {
        while !self.at_end() {
            self.parse_top_statement()?;
        }

        for (local, exported, line) in std::mem::take(&mut self.export_lists) {
            if self.import_locals.contains(&local) {
                return Err(ParseError::new(
                    format!("re-exporting imported binding '{}' is not supported", local),
                    line,
                ));
            }
            if !self.declared.contains(&local) {
                return Err(ParseError::new(
                    format!("export '{}' is not defined in this module", local),
                    line,
                ));
            }
            self.aliases.entry(local).or_default().push(exported);
        }

        let program = Program {
            stmts: self.stmts,
            declared: self.declared,
            aliases: self.aliases,
        };
        Ok(ScriptModule {
            imports: self.imports,
            exports: self.exports,
            body: Some(Arc::new(ScannedBody(Arc::new(program)))),
        })
    }

    fn parse_top_statement(&mut self) -> PResult<()> {
        match self.peek() {
            Some(Token::Semicolon) => {
                self.pos += 1;
                Ok(())
            }
            Some(Token::Import)
                if !matches!(self.peek_at(1), Some(Token::LeftParen) | Some(Token::Dot)) =>
            {
                self.parse_import()
            }
            Some(Token::Export) => self.parse_export(),
            Some(Token::Const) | Some(Token::Let) | Some(Token::Var) => {
                let stmts = self.parse_declaration(true, false)?;
                self.stmts.extend(stmts);
                Ok(())
            }
            Some(Token::Function) => {
                let def = self.parse_function(true)?;
                self.declare_function(&def, false)?;
                self.stmts.push(Stmt::Function(def));
                Ok(())
            }
            Some(Token::Class) => Err(self.error("classes are not supported")),
            Some(Token::Async) => Err(self.error("async functions are not supported")),
            Some(Token::Await) => Err(self.error("top-level await is not supported")),
            Some(Token::RightBrace) => Err(self.error("unexpected '}'")),
            Some(Token::Type) | Some(Token::Interface)
                if matches!(self.peek_at(1), Some(Token::Ident(_))) =>
            {
                self.skip_type_declaration()
            }
            _ => {
                let stmt = self.parse_statement()?;
                self.stmts.push(stmt);
                Ok(())
            }
        }
    }

    /// `if`, `throw` or an expression statement
    fn parse_statement(&mut self) -> PResult<Stmt> {
        match self.peek() {
            Some(Token::If) => self.parse_if(),
            Some(Token::Return) => Err(self.error("'return' outside of a function")),
            Some(Token::Throw) => {
                self.pos += 1;
                if self.on_new_line() {
                    return Err(self.error("illegal newline after throw"));
                }
                let value = self.parse_expression()?;
                self.end_statement()?;
                Ok(Stmt::Throw(value))
            }
            Some(Token::Ident(name)) if UNSUPPORTED_STATEMENTS.contains(&name.as_str()) => {
                Err(self.error(format!("'{}' statements are not supported", name)))
            }
            _ => {
                let expr = self.parse_expression()?;
                self.end_statement()?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        self.expect(&Token::If, "'if'")?;
        self.expect(&Token::LeftParen, "'('")?;
        let condition = self.parse_expression()?;
        self.expect(&Token::RightParen, "')'")?;

        let then_branch = self.parse_branch()?;
        let else_branch = if !self.eat(&Token::Else) {
            Vec::new()
        } else if self.check(&Token::If) {
            vec![self.parse_if()?]
        } else {
            self.parse_branch()?
        };

        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    /// Braced block or single statement after `if (...)` / `else`
    fn parse_branch(&mut self) -> PResult<Vec<Stmt>> {
        if !self.eat(&Token::LeftBrace) {
            return self.parse_nested_statement();
        }
        let mut stmts = Vec::new();
        while !self.eat(&Token::RightBrace) {
            if self.at_end() {
                return Err(self.error("unterminated block"));
            }
            stmts.extend(self.parse_nested_statement()?);
        }
        Ok(stmts)
    }

    fn declare_local(&mut self, name: &Arc<str>) -> PResult<()> {
        if self.declared.contains(name) || self.import_locals.contains(name) {
            return Err(self.error(format!("identifier '{}' has already been declared", name)));
        }
        self.declared.insert(name.clone());
        Ok(())
    }

    fn add_export(&mut self, name: Arc<str>) -> PResult<()> {
        if self.exports.contains(&name) {
            return Err(self.error(format!("duplicate export '{}'", name)));
        }
        self.exports.push(name);
        Ok(())
    }

    fn declare_function(&mut self, def: &FunctionDef, export: bool) -> PResult<()> {
        if let Some(name) = &def.name {
            self.declare_local(name)?;
            if export {
                self.aliases.entry(name.clone()).or_default().push(name.clone());
                self.add_export(name.clone())?;
            }
        }
        Ok(())
    }

    fn parse_import(&mut self) -> PResult<()> {
        self.expect(&Token::Import, "'import'")?;

        // `import type X from ...`, but not a default import named `type`
        let mut type_only = false;
        if self.check(&Token::Type)
            && !matches!(self.peek_at(1), Some(Token::From) | Some(Token::Comma))
        {
            type_only = true;
            self.pos += 1;
        }

        if let Some(Token::Str(specifier)) = self.peek() {
            let mut entry = ImportEntry::new(&specifier.clone());
            self.pos += 1;
            entry.attributes = self.parse_attributes_clause()?;
            self.end_statement()?;
            self.imports.push(entry);
            return Ok(());
        }

        let mut bindings = Vec::new();

        if let Some(local) = self.peek().and_then(Token::identifier).map(Arc::<str>::from) {
            if !(self.check(&Token::From) && matches!(self.peek_at(1), Some(Token::Str(_)))) {
                self.pos += 1;
                bindings.push(ImportBinding::Default { local });
                if !self.eat(&Token::Comma) {
                    return self.finish_import(bindings, type_only);
                }
            }
        }

        if self.eat(&Token::Star) {
            self.expect(&Token::As, "'as'")?;
            let local = self.expect_identifier()?;
            bindings.push(ImportBinding::Namespace { local });
        } else if self.eat(&Token::LeftBrace) {
            while !self.eat(&Token::RightBrace) {
                // Inline `type` specifiers are erased
                let inline_type = self.check(&Token::Type)
                    && !matches!(
                        self.peek_at(1),
                        Some(Token::As) | Some(Token::Comma) | Some(Token::RightBrace)
                    );
                if inline_type {
                    self.pos += 1;
                }

                let bindable = self.peek().and_then(Token::identifier).is_some();
                let imported = self.expect_name()?;
                let local = if self.eat(&Token::As) {
                    self.expect_identifier()?
                } else if bindable {
                    imported.clone()
                } else {
                    return Err(self.error(format!("'{}' must be renamed with 'as'", imported)));
                };

                if !inline_type {
                    bindings.push(if &*imported == "default" {
                        ImportBinding::Default { local }
                    } else {
                        ImportBinding::Named { imported, local }
                    });
                }

                if !self.eat(&Token::Comma) {
                    self.expect(&Token::RightBrace, "'}'")?;
                    break;
                }
            }
        } else {
            return Err(self.error("malformed import declaration"));
        }

        self.finish_import(bindings, type_only)
    }

    fn finish_import(&mut self, bindings: Vec<ImportBinding>, type_only: bool) -> PResult<()> {
        self.expect(&Token::From, "'from'")?;
        let specifier = self.expect_string()?;
        let attributes = self.parse_attributes_clause()?;
        self.end_statement()?;

        if !type_only {
            for binding in &bindings {
                let local: Arc<str> = Arc::from(binding.local());
                if self.import_locals.contains(&local) || self.declared.contains(&local) {
                    return Err(self.error(format!("identifier '{}' has already been declared", local)));
                }
                self.import_locals.insert(local);
            }
        }

        self.imports.push(ImportEntry {
            specifier,
            attributes,
            bindings,
            type_only,
        });
        Ok(())
    }

    /// `with { type: "json" }` (or the older `assert { ... }`)
    fn parse_attributes_clause(&mut self) -> PResult<Attributes> {
        let mut attributes = Attributes::new();
        if !(self.eat(&Token::With) || self.eat(&Token::Assert)) {
            return Ok(attributes);
        }

        self.expect(&Token::LeftBrace, "'{'")?;
        while !self.eat(&Token::RightBrace) {
            let key = self.expect_name()?;
            self.expect(&Token::Colon, "':'")?;
            let value = self.expect_string()?;
            if attributes.get(&key).is_some() {
                return Err(self.error(format!("duplicate import attribute '{}'", key)));
            }
            attributes.insert(&key, &value);
            if !self.eat(&Token::Comma) {
                self.expect(&Token::RightBrace, "'}'")?;
                break;
            }
        }
        Ok(attributes)
    }

    fn parse_export(&mut self) -> PResult<()> {
        self.expect(&Token::Export, "'export'")?;

        match self.peek() {
            Some(Token::Default) => {
                self.pos += 1;
                match self.peek() {
                    Some(Token::Function) => {
                        let def = self.parse_function(false)?;
                        match &def.name {
                            Some(name) => {
                                self.declare_local(name)?;
                                self.aliases
                                    .entry(name.clone())
                                    .or_default()
                                    .push(Arc::from("default"));
                                self.stmts.push(Stmt::Function(def));
                            }
                            None => self.stmts.push(Stmt::ExportDefault(Expr::Function(def))),
                        }
                    }
                    Some(Token::Class) => return Err(self.error("classes are not supported")),
                    Some(Token::Async) => {
                        return Err(self.error("async functions are not supported"))
                    }
                    _ => {
                        let expr = self.parse_expression()?;
                        self.end_statement()?;
                        self.stmts.push(Stmt::ExportDefault(expr));
                    }
                }
                self.add_export(Arc::from("default"))
            }
            Some(Token::Const) | Some(Token::Let) | Some(Token::Var) => {
                let stmts = self.parse_declaration(true, true)?;
                self.stmts.extend(stmts);
                Ok(())
            }
            Some(Token::Function) => {
                let def = self.parse_function(true)?;
                self.declare_function(&def, true)?;
                self.stmts.push(Stmt::Function(def));
                Ok(())
            }
            Some(Token::LeftBrace) => {
                self.pos += 1;
                let mut entries = Vec::new();
                while !self.eat(&Token::RightBrace) {
                    let line = self.line();
                    let local = self.expect_name()?;
                    let exported = if self.eat(&Token::As) {
                        self.expect_name()?
                    } else {
                        local.clone()
                    };
                    entries.push((local, exported, line));
                    if !self.eat(&Token::Comma) {
                        self.expect(&Token::RightBrace, "'}'")?;
                        break;
                    }
                }
                if self.check(&Token::From) {
                    return Err(self.error("re-exports are not supported"));
                }
                self.end_statement()?;
                for (local, exported, line) in entries {
                    self.add_export(exported.clone())?;
                    self.export_lists.push((local, exported, line));
                }
                Ok(())
            }
            Some(Token::Star) => Err(self.error("re-exports are not supported")),
            Some(Token::Class) => Err(self.error("classes are not supported")),
            Some(Token::Async) => Err(self.error("async functions are not supported")),
            Some(Token::Type) | Some(Token::Interface) => self.skip_type_declaration(),
            _ => Err(self.error("unsupported export declaration")),
        }
    }

    // ------------------------------------------------------------------
    // Declarations and functions
    // ------------------------------------------------------------------

    fn parse_declaration(&mut self, top_level: bool, export: bool) -> PResult<Vec<Stmt>> {
        let constant = match self.advance() {
            Some(Token::Const) => true,
            Some(Token::Let) | Some(Token::Var) => false,
            _ => return Err(self.error("expected declaration")),
        };

        let mut stmts = Vec::new();
        loop {
            if matches!(self.peek(), Some(Token::LeftBrace) | Some(Token::LeftBracket)) {
                return Err(self.error("destructuring declarations are not supported"));
            }
            let name = self.expect_identifier()?;
            if self.eat(&Token::Colon) {
                self.skip_type(&[Token::Eq, Token::Comma, Token::Semicolon]);
            }

            let init = if self.eat(&Token::Eq) {
                Some(self.parse_assignment()?)
            } else if constant {
                return Err(self.error(format!("missing initializer in const declaration '{}'", name)));
            } else {
                None
            };

            if top_level {
                self.declare_local(&name)?;
                if export {
                    self.aliases.entry(name.clone()).or_default().push(name.clone());
                    self.add_export(name.clone())?;
                }
            }
            stmts.push(Stmt::Declare {
                name,
                init,
                constant,
            });

            if !self.eat(&Token::Comma) {
                break;
            }
        }

        self.end_statement()?;
        Ok(stmts)
    }

    fn parse_function(&mut self, require_name: bool) -> PResult<Arc<FunctionDef>> {
        self.expect(&Token::Function, "'function'")?;
        if self.check(&Token::Star) {
            return Err(self.error("generator functions are not supported"));
        }

        let name = match self.peek().and_then(Token::identifier) {
            Some(_) => Some(self.expect_identifier()?),
            None if require_name => return Err(self.error("function name expected")),
            None => None,
        };

        self.expect(&Token::LeftParen, "'('")?;
        let params = self.parse_params()?;
        if self.eat(&Token::Colon) {
            self.skip_type(&[Token::LeftBrace]);
        }
        let body = FunctionBody::Block(self.parse_block_body()?);

        Ok(Arc::new(FunctionDef { name, params, body }))
    }

    /// Parameter list after `(`, through the closing `)`
    fn parse_params(&mut self) -> PResult<Vec<Arc<str>>> {
        let mut params = Vec::new();
        while !self.eat(&Token::RightParen) {
            if matches!(self.peek(), Some(Token::LeftBrace) | Some(Token::LeftBracket)) {
                return Err(self.error("destructuring parameters are not supported"));
            }
            params.push(self.expect_identifier()?);
            if matches!(self.peek(), Some(Token::Operator(op)) if op == "?") {
                self.pos += 1;
            }
            if self.eat(&Token::Colon) {
                self.skip_type(&[Token::Comma, Token::RightParen]);
            }
            if self.check(&Token::Eq) {
                return Err(self.error("default parameter values are not supported"));
            }
            if !self.eat(&Token::Comma) {
                self.expect(&Token::RightParen, "')'")?;
                break;
            }
        }
        Ok(params)
    }

    fn parse_block_body(&mut self) -> PResult<Vec<Stmt>> {
        self.expect(&Token::LeftBrace, "'{'")?;
        self.function_depth += 1;
        let mut stmts = Vec::new();
        while !self.eat(&Token::RightBrace) {
            if self.at_end() {
                self.function_depth -= 1;
                return Err(self.error("unterminated function body"));
            }
            let parsed = self.parse_nested_statement();
            match parsed {
                Ok(parsed) => stmts.extend(parsed),
                Err(failure) => {
                    self.function_depth -= 1;
                    return Err(failure);
                }
            }
        }
        self.function_depth -= 1;
        Ok(stmts)
    }

    /// Statement inside a function body or a block
    fn parse_nested_statement(&mut self) -> PResult<Vec<Stmt>> {
        match self.peek() {
            Some(Token::Semicolon) => {
                self.pos += 1;
                Ok(Vec::new())
            }
            Some(Token::Return) if self.function_depth == 0 => {
                Err(self.error("'return' outside of a function"))
            }
            Some(Token::Return) => {
                self.pos += 1;
                let value = if self.check(&Token::Semicolon)
                    || self.check(&Token::RightBrace)
                    || self.on_new_line()
                {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.end_statement()?;
                Ok(vec![Stmt::Return(value)])
            }
            Some(Token::Const) | Some(Token::Let) | Some(Token::Var) => {
                self.parse_declaration(false, false)
            }
            Some(Token::Function) => Ok(vec![Stmt::Function(self.parse_function(true)?)]),
            Some(Token::Await) | Some(Token::Async) => {
                Err(self.error("async functions are not supported"))
            }
            Some(Token::Class) => Err(self.error("classes are not supported")),
            Some(Token::Export) => {
                Err(self.error("export declarations may only appear at the top level"))
            }
            Some(Token::Import)
                if !matches!(self.peek_at(1), Some(Token::LeftParen) | Some(Token::Dot)) =>
            {
                Err(self.error("import declarations may only appear at the top level"))
            }
            _ => Ok(vec![self.parse_statement()?]),
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn parse_expression(&mut self) -> PResult<Expr> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> PResult<Expr> {
        if self.arrow_ahead() {
            return self.parse_arrow();
        }

        let target = self.parse_additive()?;

        // `expr as Type` casts are erased
        while self.eat(&Token::As) {
            self.skip_type(&[
                Token::Semicolon,
                Token::Comma,
                Token::RightParen,
                Token::RightBrace,
                Token::RightBracket,
                Token::Eq,
            ]);
        }

        if self.eat(&Token::Eq) {
            if !matches!(target, Expr::Ident(_) | Expr::Member(..)) {
                return Err(self.error("invalid assignment target"));
            }
            let value = self.parse_assignment()?;
            return Ok(Expr::Assign(Box::new(target), Box::new(value)));
        }
        Ok(target)
    }

    /// `x =>` or `( ... ) =>`
    fn arrow_ahead(&self) -> bool {
        if self.peek().and_then(Token::identifier).is_some() {
            return self.peek_at(1) == Some(&Token::Arrow);
        }
        if !self.check(&Token::LeftParen) {
            return false;
        }

        let mut depth = 0usize;
        let mut offset = 0;
        while let Some(token) = self.peek_at(offset) {
            match token {
                Token::LeftParen | Token::LeftBrace | Token::LeftBracket => depth += 1,
                Token::RightParen | Token::RightBrace | Token::RightBracket => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        // Optional return type annotation: `(a): T =>`
                        return matches!(
                            self.peek_at(offset + 1),
                            Some(Token::Arrow) | Some(Token::Colon)
                        ) && self.arrow_after(offset + 1);
                    }
                }
                _ => {}
            }
            offset += 1;
        }
        false
    }

    fn arrow_after(&self, mut offset: usize) -> bool {
        while let Some(token) = self.peek_at(offset) {
            match token {
                Token::Arrow => return true,
                Token::Semicolon | Token::LeftBrace | Token::Eq => return false,
                _ => offset += 1,
            }
        }
        false
    }

    fn parse_arrow(&mut self) -> PResult<Expr> {
        let params = if self.eat(&Token::LeftParen) {
            let params = self.parse_params()?;
            if self.eat(&Token::Colon) {
                self.skip_type(&[Token::Arrow]);
            }
            params
        } else {
            vec![self.expect_identifier()?]
        };
        self.expect(&Token::Arrow, "'=>'")?;

        let body = if self.check(&Token::LeftBrace) {
            FunctionBody::Block(self.parse_block_body()?)
        } else {
            self.function_depth += 1;
            let body = self.parse_assignment();
            self.function_depth -= 1;
            FunctionBody::Expr(body?)
        };

        Ok(Expr::Function(Arc::new(FunctionDef {
            name: None,
            params,
            body,
        })))
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = if self.eat(&Token::Plus) {
                BinaryOp::Add
            } else if self.eat(&Token::Minus) {
                BinaryOp::Sub
            } else {
                break;
            };
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        if self.eat(&Token::Minus) {
            return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
        }
        if matches!(self.peek(), Some(Token::Operator(op)) if op == "!") {
            self.pos += 1;
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        if self.check(&Token::Await) {
            return Err(if self.function_depth == 0 {
                self.error("top-level await is not supported")
            } else {
                self.error("async functions are not supported")
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(&Token::Dot) {
                let name = self.expect_name()?;
                expr = Expr::Member(Box::new(expr), name);
            } else if self.check(&Token::LeftParen) && !self.on_new_line() {
                self.pos += 1;
                let args = self.parse_arguments()?;
                expr = Expr::Call(Box::new(expr), args);
            } else if self.check(&Token::LeftBracket) && !self.on_new_line() {
                self.pos += 1;
                let index = self.parse_assignment()?;
                self.expect(&Token::RightBracket, "']'")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                break;
            }
        }
        Ok(expr)
    }

    /// Arguments after `(`, through the closing `)`
    fn parse_arguments(&mut self) -> PResult<Vec<Expr>> {
        let mut args = Vec::new();
        while !self.eat(&Token::RightParen) {
            args.push(self.parse_assignment()?);
            if !self.eat(&Token::Comma) {
                self.expect(&Token::RightParen, "')'")?;
                break;
            }
        }
        Ok(args)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let token = match self.peek() {
            Some(token) => token.clone(),
            None => return Err(self.error("unexpected end of input")),
        };

        match token {
            Token::Number(n) => {
                self.pos += 1;
                Ok(Expr::Literal(Value::Number(n)))
            }
            Token::Str(s) => {
                self.pos += 1;
                Ok(Expr::Literal(Value::from(s)))
            }
            Token::Template(raw) => {
                let line = self.line();
                self.pos += 1;
                self.parse_template(&raw, line)
            }
            Token::True => {
                self.pos += 1;
                Ok(Expr::Literal(Value::Bool(true)))
            }
            Token::False => {
                self.pos += 1;
                Ok(Expr::Literal(Value::Bool(false)))
            }
            Token::Null => {
                self.pos += 1;
                Ok(Expr::Literal(Value::Null))
            }
            Token::LeftParen => {
                self.pos += 1;
                let expr = self.parse_assignment()?;
                self.expect(&Token::RightParen, "')'")?;
                Ok(expr)
            }
            Token::LeftBrace => self.parse_object(),
            Token::Import => {
                self.pos += 1;
                if self.eat(&Token::Dot) {
                    return match self.expect_name()? {
                        name if &*name == "meta" => Ok(Expr::ImportMeta),
                        name => Err(self.error(format!("unknown meta property import.{}", name))),
                    };
                }
                self.expect(&Token::LeftParen, "'('")?;
                let specifier = self.parse_assignment()?;
                let options = if self.eat(&Token::Comma) && !self.check(&Token::RightParen) {
                    Some(Box::new(self.parse_assignment()?))
                } else {
                    None
                };
                self.eat(&Token::Comma);
                self.expect(&Token::RightParen, "')'")?;
                Ok(Expr::DynamicImport(Box::new(specifier), options))
            }
            Token::Function => Ok(Expr::Function(self.parse_function(false)?)),
            // `new F(args)` calls F
            Token::New => {
                self.pos += 1;
                let mut callee = self.parse_primary()?;
                while self.eat(&Token::Dot) {
                    callee = Expr::Member(Box::new(callee), self.expect_name()?);
                }
                let args = if self.eat(&Token::LeftParen) {
                    self.parse_arguments()?
                } else {
                    Vec::new()
                };
                Ok(Expr::Call(Box::new(callee), args))
            }
            Token::Class => Err(self.error("classes are not supported")),
            Token::Async => Err(self.error("async functions are not supported")),
            other => match other.identifier() {
                Some(name) => {
                    self.pos += 1;
                    Ok(Expr::Ident(Arc::from(name)))
                }
                None => Err(self.error(format!("unexpected token {:?}", other))),
            },
        }
    }

    /// Template literal as a string concatenation of its parts
    fn parse_template(&self, raw: &str, line: usize) -> PResult<Expr> {
        let mut parts = Vec::new();
        let mut offset = 0;

        while let Some(start) = raw[offset..].find("${").map(|i| offset + i) {
            parts.push(Expr::Literal(Value::from(unescape(&raw[offset..start]))));
            let inner = start + 2;
            let end = closing_brace(&raw[inner..])
                .map(|i| inner + i)
                .ok_or_else(|| ParseError::new("unterminated template substitution", line))?;
            let substitution_line = line + raw[..inner].matches('\n').count();
            parts.push(self.parse_substitution(&raw[inner..end], substitution_line)?);
            offset = end + 1;
        }
        parts.push(Expr::Literal(Value::from(unescape(&raw[offset..]))));

        // The leading string part makes every `+` a concatenation
        Ok(parts
            .into_iter()
            .reduce(|left, right| Expr::Binary(BinaryOp::Add, Box::new(left), Box::new(right)))
            .unwrap_or_else(|| Expr::Literal(Value::from(""))))
    }

    fn parse_substitution(&self, source: &str, line: usize) -> PResult<Expr> {
        let mut tokens = tokenize(source)
            .map_err(|error| ParseError::new(error.message, line + error.line - 1))?;
        for token in &mut tokens {
            token.line += line - 1;
        }
        if tokens.is_empty() {
            return Err(ParseError::new("empty template substitution", line));
        }

        let mut parser = Parser::new(tokens);
        parser.function_depth = self.function_depth;
        let expr = parser.parse_expression()?;
        if !parser.at_end() {
            return Err(parser.error("unexpected token in template substitution"));
        }
        Ok(expr)
    }

    fn parse_object(&mut self) -> PResult<Expr> {
        self.expect(&Token::LeftBrace, "'{'")?;
        let mut entries = Vec::new();
        while !self.eat(&Token::RightBrace) {
            let key = match self.peek() {
                Some(Token::Number(n)) => {
                    let key = Arc::from(Value::Number(*n).to_string());
                    self.pos += 1;
                    key
                }
                _ => self.expect_name()?,
            };
            let value = if self.eat(&Token::Colon) {
                self.parse_assignment()?
            } else {
                Expr::Ident(key.clone())
            };
            entries.push((key, value));
            if !self.eat(&Token::Comma) {
                self.expect(&Token::RightBrace, "'}'")?;
                break;
            }
        }
        Ok(Expr::Object(entries))
    }
}

/// Index of the `}` closing a `${` substitution
fn closing_brace(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '{' => depth += 1,
            '}' if depth == 0 => return Some(i),
            '}' => depth -= 1,
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(source: &str) -> ScriptModule {
        DeclarationScanner::new().scan(source).unwrap()
    }

    fn scan_err(source: &str) -> ParseError {
        DeclarationScanner::new().scan(source).unwrap_err()
    }

    fn exports(module: &ScriptModule) -> Vec<&str> {
        module.exports.iter().map(|n| &**n).collect()
    }

    #[test]
    fn test_import_forms() {
        let module = scan(
            r#"
            import "./setup.js";
            import config from "./config.json" with { type: "json" };
            import { a, b as c, default as d } from "./lib.js";
            import * as ns from "./ns.js";
            import def, { x } from "./mixed.js";
            "#,
        );

        assert_eq!(module.imports.len(), 5);
        assert!(module.imports[0].is_side_effect_only());
        assert_eq!(module.imports[1].attributes, Attributes::of_type("json"));
        assert_eq!(
            module.imports[2].bindings,
            vec![
                ImportBinding::Named {
                    imported: Arc::from("a"),
                    local: Arc::from("a")
                },
                ImportBinding::Named {
                    imported: Arc::from("b"),
                    local: Arc::from("c")
                },
                ImportBinding::Default {
                    local: Arc::from("d")
                },
            ]
        );
        assert_eq!(
            module.imports[3].bindings,
            vec![ImportBinding::Namespace {
                local: Arc::from("ns")
            }]
        );
        assert_eq!(module.imports[4].bindings.len(), 2);
    }

    #[test]
    fn test_type_only_imports_are_marked() {
        let module = scan(
            r#"
            import type { User } from "./types.js";
            import { type Config, load } from "./config.js";
            "#,
        );
        assert!(module.imports[0].type_only);
        assert!(!module.imports[1].type_only);
        assert_eq!(module.imports[1].bindings.len(), 1);
        assert_eq!(module.imports[1].bindings[0].local(), "load");
    }

    #[test]
    fn test_export_forms() {
        let module = scan(
            r#"
            export const a = 1, b = 2;
            export function f() { return a; }
            const hidden = 3;
            export { hidden as visible };
            export default a + b;
            export type Shape = { kind: string };
            export interface Point { x: number }
            "#,
        );
        assert_eq!(exports(&module), vec!["a", "b", "f", "visible", "default"]);
    }

    #[test]
    fn test_export_default_function() {
        let module = scan("export default function main() { return 1 }");
        assert_eq!(exports(&module), vec!["default"]);
    }

    #[test]
    fn test_control_flow_statements() {
        let module = scan(
            r#"
            const items = 3;
            if (!items) {
                console.log("none");
            } else if (items) console.log("some");
            else {
                throw new Error("unreachable");
            }
            export function check(value) {
                if (value) return value;
                throw "missing value";
            }
            "#,
        );
        assert_eq!(exports(&module), vec!["check"]);
    }

    #[test]
    fn test_unsupported_statements_are_errors() {
        let err = scan_err("const items = 3;\nfor (let i = 0; i < items; i++) {}");
        assert!(err.message.contains("'for' statements"));
        assert_eq!(err.line, 2);

        let err = scan_err("function f() {\n  try { g() } catch (e) {}\n}");
        assert!(err.message.contains("'try' statements"));
        assert_eq!(err.line, 2);

        assert!(DeclarationScanner::new().scan("const a = 1;\nif (a > 2) { a }").is_err());
        assert!(scan_err("return 1;").message.contains("outside of a function"));
        assert!(scan_err("throw\nnew Error()").message.contains("newline"));
    }

    #[test]
    fn test_template_substitutions() {
        let module = scan("const who = 'x';\nexport const greeting = `hi ${who}\\n${1 + 2}`;");
        assert_eq!(exports(&module), vec!["greeting"]);

        let err = scan_err("const a = 1;\nconst b = `\n${a +}`;");
        assert_eq!(err.line, 3);
        assert!(scan_err("const b = `${a`;").message.contains("unterminated"));
    }

    #[test]
    fn test_type_annotations_are_erased() {
        let module = scan(
            r#"
            const port: number = 8080;
            export function add(a: number, b?: number): number { return a + b; }
            export const conf = { port } as const;
            "#,
        );
        assert_eq!(exports(&module), vec!["add", "conf"]);
    }

    #[test]
    fn test_rejected_constructs() {
        assert!(scan_err("export * from './a.js';").message.contains("re-export"));
        assert!(scan_err("export { a } from './a.js';").message.contains("re-export"));
        assert!(scan_err("class A {}").message.contains("classes"));
        let err = scan_err("const a = 1;\nconst b = await import('./b.js');");
        assert!(err.message.contains("top-level await"));
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_reexporting_an_import_is_rejected() {
        let err = scan_err("import { a } from './a.js';\nexport { a };");
        assert!(err.message.contains("re-exporting"));
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_export_of_undeclared_name() {
        assert!(scan_err("export { nope };").message.contains("not defined"));
    }

    #[test]
    fn test_duplicate_declarations() {
        assert!(scan_err("export const a = 1;\nexport { a };").message.contains("duplicate export"));
        assert!(scan_err("let a = 1;\nlet a = 2;").message.contains("already been declared"));
        assert!(scan_err("import a from './a.js';\nconst a = 1;")
            .message
            .contains("already been declared"));
    }

    #[test]
    fn test_attribute_clause_errors() {
        assert!(DeclarationScanner::new()
            .scan("import d from './d.json' with { type: \"json\", type: \"css\" };")
            .is_err());
        assert!(DeclarationScanner::new()
            .scan("import d from './d.json' with { type: json };")
            .is_err());
    }

    #[test]
    fn test_dynamic_import_and_meta_are_expressions() {
        let module = scan(
            r#"
            import("./lazy.js").then(ns => console.log(ns.value));
            const here = import.meta.url;
            "#,
        );
        assert!(module.imports.is_empty());
        assert!(module.exports.is_empty());
    }
}
