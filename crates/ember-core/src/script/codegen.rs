//! Code generation: syntax tree to [`Proto`].
//!
//! Locals live in fixed frame slots; expressions are evaluated on the
//! operand stack above them. Functions see only their own locals and
//! globals.

use std::rc::Rc;

use super::ast::*;
use super::diagnostic::Diagnostic;
use crate::bytecode::opcode::{OpCode, MULTRET};
use crate::bytecode::proto::{Constant, LineInfo, Proto};

/// Largest argument, result or value count encodable in one operand byte
const MAX_COUNT: usize = MULTRET as usize - 1;

type GenResult<T> = Result<T, Diagnostic>;

struct FuncState {
    proto: Proto,
    /// Active locals, innermost last
    locals: Vec<(Rc<str>, u8)>,
    /// `locals.len()` and free slot at each scope entry
    scopes: Vec<(usize, usize)>,
    next_slot: usize,
    /// Pending `break` jumps, one list per enclosing loop
    breaks: Vec<Vec<usize>>,
    line: u32,
}

impl FuncState {
    fn new(name: &str, line_defined: u32) -> Self {
        FuncState {
            proto: Proto {
                name: name.to_string(),
                line_defined,
                ..Proto::default()
            },
            locals: Vec::new(),
            scopes: Vec::new(),
            next_slot: 0,
            breaks: Vec::new(),
            line: line_defined,
        }
    }

    fn local(&self, name: &str) -> Option<u8> {
        self.locals
            .iter()
            .rev()
            .find(|(local, _)| &**local == name)
            .map(|(_, slot)| *slot)
    }
}

pub struct CodeGen<'a> {
    chunk: &'a str,
    funcs: Vec<FuncState>,
    /// Statement and expression nesting, bounded like the parser's
    depth: u32,
}

impl<'a> CodeGen<'a> {
    pub fn new(chunk: &'a str) -> Self {
        CodeGen {
            chunk,
            funcs: Vec::new(),
            depth: 0,
        }
    }

    /// Compile the main chunk
    pub fn generate(mut self, block: &Block) -> GenResult<Proto> {
        self.funcs.push(FuncState::new("", 0));
        self.block(block)?;
        self.emit_u8(OpCode::Return, 0);
        self.finish()
    }

    fn finish(&mut self) -> GenResult<Proto> {
        let state = self
            .funcs
            .pop()
            .ok_or_else(|| self.error("no function to finish"))?;
        Ok(state.proto)
    }

    fn fs(&mut self) -> &mut FuncState {
        let last = self.funcs.len() - 1;
        &mut self.funcs[last]
    }

    fn fs_ref(&self) -> &FuncState {
        &self.funcs[self.funcs.len() - 1]
    }

    fn error(&self, message: impl Into<String>) -> Diagnostic {
        let line = self.funcs.last().map(|f| f.line).unwrap_or(0);
        Diagnostic::new(self.chunk, line, message)
    }

    // Emission

    fn pc(&self) -> usize {
        self.fs_ref().proto.code.len()
    }

    fn mark_line(&mut self) {
        let offset = self.pc() as u32;
        let fs = self.fs();
        let line = fs.line;
        match fs.proto.lines.last_mut() {
            Some(last) if last.line == line => {}
            Some(last) if last.offset == offset => last.line = line,
            _ => fs.proto.lines.push(LineInfo { offset, line }),
        }
    }

    fn emit(&mut self, op: OpCode) {
        self.mark_line();
        self.fs().proto.code.push(op as u8);
    }

    fn emit_u8(&mut self, op: OpCode, a: u8) {
        self.emit(op);
        self.fs().proto.code.push(a);
    }

    fn emit_u16(&mut self, op: OpCode, a: u16) {
        self.emit(op);
        self.fs().proto.code.extend_from_slice(&a.to_be_bytes());
    }

    fn emit_u8u8(&mut self, op: OpCode, a: u8, b: u8) {
        self.emit(op);
        self.fs().proto.code.extend_from_slice(&[a, b]);
    }

    /// Emit a jump with a placeholder target; returns the operand position
    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_u16(op, 0);
        self.pc() - 2
    }

    fn emit_for(&mut self, op: OpCode, slot: u8, target: u16) -> usize {
        self.emit(op);
        let fs = self.fs();
        fs.proto.code.push(slot);
        fs.proto.code.extend_from_slice(&target.to_be_bytes());
        fs.proto.code.len() - 2
    }

    fn label(&self) -> GenResult<u16> {
        u16::try_from(self.pc()).map_err(|_| self.error("function or expression too complex"))
    }

    fn patch(&mut self, at: usize, target: u16) {
        let bytes = target.to_be_bytes();
        let code = &mut self.fs().proto.code;
        code[at] = bytes[0];
        code[at + 1] = bytes[1];
    }

    fn patch_here(&mut self, at: usize) -> GenResult<()> {
        let here = self.label()?;
        self.patch(at, here);
        Ok(())
    }

    fn constant(&mut self, constant: Constant) -> GenResult<u16> {
        let constants = &self.fs_ref().proto.constants;
        let existing = constants.iter().position(|c| match (c, &constant) {
            // Distinguish 0.0 from -0.0 and keep NaN out of the pool's lookups
            (Constant::Number(a), Constant::Number(b)) => a.to_bits() == b.to_bits(),
            (a, b) => a == b,
        });
        let index = match existing {
            Some(index) => index,
            None => {
                self.fs().proto.constants.push(constant);
                self.fs_ref().proto.constants.len() - 1
            }
        };
        u16::try_from(index).map_err(|_| self.error("too many constants"))
    }

    fn string_constant(&mut self, s: &str) -> GenResult<u16> {
        self.constant(Constant::Str(s.to_string()))
    }

    fn push_constant(&mut self, constant: Constant) -> GenResult<()> {
        let index = self.constant(constant)?;
        self.emit_u16(OpCode::Push, index);
        Ok(())
    }

    fn count(&self, n: usize, what: &str) -> GenResult<u8> {
        if n > MAX_COUNT {
            return Err(self.error(format!("too many {what}")));
        }
        Ok(n as u8)
    }

    // Scopes and locals

    fn enter_scope(&mut self) {
        let fs = self.fs();
        let mark = (fs.locals.len(), fs.next_slot);
        fs.scopes.push(mark);
    }

    fn exit_scope(&mut self) {
        let fs = self.fs();
        if let Some((locals, slot)) = fs.scopes.pop() {
            fs.locals.truncate(locals);
            fs.next_slot = slot;
        }
    }

    /// Reserve `n` consecutive slots and return the first
    fn alloc_slots(&mut self, n: usize) -> GenResult<u8> {
        let first = self.fs_ref().next_slot;
        let end = first + n;
        if end > u8::MAX as usize {
            return Err(self.error("too many local variables"));
        }
        let fs = self.fs();
        fs.next_slot = end;
        if end > fs.proto.max_locals as usize {
            fs.proto.max_locals = end as u8;
        }
        Ok(first as u8)
    }

    fn activate(&mut self, name: Rc<str>, slot: u8) {
        self.fs().locals.push((name, slot));
    }

    // Statements

    fn block(&mut self, block: &Block) -> GenResult<()> {
        self.enter_scope();
        for stmt in block {
            self.statement(stmt)?;
        }
        self.exit_scope();
        Ok(())
    }

    fn enter_level(&mut self) -> GenResult<()> {
        self.depth += 1;
        if self.depth > MAX_SYNTAX_LEVELS {
            return Err(self.error("chunk has too many syntax levels"));
        }
        Ok(())
    }

    fn statement(&mut self, stmt: &Stmt) -> GenResult<()> {
        self.enter_level()?;
        let result = self.statement_code(stmt);
        self.depth -= 1;
        result
    }

    fn statement_code(&mut self, stmt: &Stmt) -> GenResult<()> {
        self.fs().line = stmt.line;
        match &stmt.kind {
            StmtKind::Local { names, values } => {
                self.expr_list_exact(values, names.len())?;
                let first = self.alloc_slots(names.len())?;
                for i in (0..names.len()).rev() {
                    self.emit_u8(OpCode::StoreLocal, first + i as u8);
                }
                for (i, name) in names.iter().enumerate() {
                    self.activate(name.clone(), first + i as u8);
                }
            }
            StmtKind::LocalFunction { name, body } => {
                let slot = self.alloc_slots(1)?;
                self.activate(name.clone(), slot);
                self.function(body)?;
                self.emit_u8(OpCode::StoreLocal, slot);
            }
            StmtKind::Assign { targets, values } => {
                self.expr_list_exact(values, targets.len())?;
                for target in targets.iter().rev() {
                    self.assign(target)?;
                }
            }
            StmtKind::Call(call) => self.call(call, 0)?,
            StmtKind::Function { path, method, body } => {
                self.function(body)?;
                let keys: Vec<&Rc<str>> = path.iter().skip(1).chain(method.iter()).collect();
                match keys.split_last() {
                    None => self.assign_name(&path[0])?,
                    Some((last, prefix)) => {
                        self.load_name(&path[0])?;
                        for key in prefix {
                            let k = self.string_constant(key)?;
                            self.emit_u16(OpCode::GetField, k);
                        }
                        let k = self.string_constant(last)?;
                        self.emit(OpCode::Swap);
                        self.emit_u16(OpCode::SetField, k);
                    }
                }
            }
            StmtKind::If { arms, otherwise } => {
                let mut exits = Vec::new();
                for (i, (cond, body)) in arms.iter().enumerate() {
                    self.expr(cond)?;
                    let skip = self.emit_jump(OpCode::JumpIfFalse);
                    self.block(body)?;
                    let is_last = i + 1 == arms.len() && otherwise.is_none();
                    if !is_last {
                        exits.push(self.emit_jump(OpCode::Jump));
                    }
                    self.patch_here(skip)?;
                }
                if let Some(body) = otherwise {
                    self.block(body)?;
                }
                for exit in exits {
                    self.patch_here(exit)?;
                }
            }
            StmtKind::While { cond, body } => {
                let start = self.label()?;
                self.expr(cond)?;
                let exit = self.emit_jump(OpCode::JumpIfFalse);
                self.loop_body(body, None)?;
                self.emit_u16(OpCode::Jump, start);
                self.patch_here(exit)?;
                self.close_loop()?;
            }
            StmtKind::Repeat { body, cond } => {
                let start = self.label()?;
                // The condition sees the body's locals
                self.fs().breaks.push(Vec::new());
                self.enter_scope();
                for stmt in body {
                    self.statement(stmt)?;
                }
                self.fs().line = cond.line;
                self.expr(cond)?;
                self.exit_scope();
                self.emit_u16(OpCode::JumpIfFalse, start);
                self.close_loop()?;
            }
            StmtKind::NumericFor {
                var,
                start,
                limit,
                step,
                body,
            } => {
                self.enter_scope();
                let base = self.alloc_slots(4)?;
                self.expr(start)?;
                self.emit_u8(OpCode::StoreLocal, base);
                self.expr(limit)?;
                self.emit_u8(OpCode::StoreLocal, base + 1);
                match step {
                    Some(step) => self.expr(step)?,
                    None => self.push_constant(Constant::Integer(1))?,
                }
                self.emit_u8(OpCode::StoreLocal, base + 2);

                let prep = self.emit_for(OpCode::ForPrep, base, 0);
                let body_start = self.label()?;
                self.loop_body(body, Some((var.clone(), base + 3)))?;
                self.emit_for(OpCode::ForLoop, base, body_start);
                self.patch_here(prep)?;
                self.close_loop()?;
                self.exit_scope();
            }
            StmtKind::GenericFor {
                names,
                values,
                body,
            } => {
                self.enter_scope();
                let base = self.alloc_slots(3)?;
                self.expr_list_exact(values, 3)?;
                for i in (0..3).rev() {
                    self.emit_u8(OpCode::StoreLocal, base + i);
                }
                let nvars = self.count(names.len(), "loop variables")?;
                let vars = self.alloc_slots(names.len())?;

                let start = self.label()?;
                for i in 0..3 {
                    self.emit_u8(OpCode::LoadLocal, base + i);
                }
                self.emit_u8u8(OpCode::Call, 2, nvars);
                for i in (0..nvars).rev() {
                    self.emit_u8(OpCode::StoreLocal, vars + i);
                }
                self.emit_u8(OpCode::LoadLocal, vars);
                self.emit(OpCode::Nil);
                self.emit(OpCode::NotEqual);
                let exit = self.emit_jump(OpCode::JumpIfFalse);
                self.emit_u8(OpCode::LoadLocal, vars);
                self.emit_u8(OpCode::StoreLocal, base + 2);

                self.fs().breaks.push(Vec::new());
                self.enter_scope();
                for (i, name) in names.iter().enumerate() {
                    self.activate(name.clone(), vars + i as u8);
                }
                for stmt in body {
                    self.statement(stmt)?;
                }
                self.exit_scope();
                self.emit_u16(OpCode::Jump, start);
                self.patch_here(exit)?;
                self.close_loop()?;
                self.exit_scope();
            }
            StmtKind::Do(body) => self.block(body)?,
            StmtKind::Return(values) => {
                let (fixed, variable) = self.expr_list_open(values)?;
                let count = if variable {
                    MULTRET
                } else {
                    self.count(fixed, "returned values")?
                };
                self.emit_u8(OpCode::Return, count);
            }
            StmtKind::Break => {
                if self.fs_ref().breaks.is_empty() {
                    return Err(self.error("break outside a loop"));
                }
                let jump = self.emit_jump(OpCode::Jump);
                if let Some(breaks) = self.fs().breaks.last_mut() {
                    breaks.push(jump);
                }
            }
        }
        Ok(())
    }

    /// Compile a loop body in its own scope, optionally binding a loop variable
    fn loop_body(&mut self, body: &Block, var: Option<(Rc<str>, u8)>) -> GenResult<()> {
        self.fs().breaks.push(Vec::new());
        self.enter_scope();
        if let Some((name, slot)) = var {
            self.activate(name, slot);
        }
        for stmt in body {
            self.statement(stmt)?;
        }
        self.exit_scope();
        Ok(())
    }

    /// Point every pending `break` of the innermost loop here
    fn close_loop(&mut self) -> GenResult<()> {
        let breaks = self.fs().breaks.pop().unwrap_or_default();
        for jump in breaks {
            self.patch_here(jump)?;
        }
        Ok(())
    }

    /// Store the value on top of the operand stack into `target`
    fn assign(&mut self, target: &Expr) -> GenResult<()> {
        self.fs().line = target.line;
        match &target.kind {
            ExprKind::Name(name) => self.assign_name(name),
            ExprKind::Index { obj, key } => {
                self.expr(obj)?;
                if let ExprKind::Str(field) = &key.kind {
                    let k = self.string_constant(field)?;
                    self.emit(OpCode::Swap);
                    self.emit_u16(OpCode::SetField, k);
                } else {
                    self.expr(key)?;
                    self.emit(OpCode::Rotate);
                    self.emit(OpCode::SetIndex);
                }
                Ok(())
            }
            _ => Err(self.error("cannot assign to this expression")),
        }
    }

    fn assign_name(&mut self, name: &Rc<str>) -> GenResult<()> {
        match self.resolve_local(name)? {
            Some(slot) => self.emit_u8(OpCode::StoreLocal, slot),
            None => {
                let k = self.string_constant(name)?;
                self.emit_u16(OpCode::SetGlobal, k);
            }
        }
        Ok(())
    }

    fn load_name(&mut self, name: &Rc<str>) -> GenResult<()> {
        match self.resolve_local(name)? {
            Some(slot) => self.emit_u8(OpCode::LoadLocal, slot),
            None => {
                let k = self.string_constant(name)?;
                self.emit_u16(OpCode::GetGlobal, k);
            }
        }
        Ok(())
    }

    /// Local slot of `name`, `None` for a global. Locals of enclosing
    /// functions are not reachable.
    fn resolve_local(&self, name: &str) -> GenResult<Option<u8>> {
        if let Some(slot) = self.fs_ref().local(name) {
            return Ok(Some(slot));
        }
        let enclosing = &self.funcs[..self.funcs.len() - 1];
        if enclosing.iter().any(|f| f.local(name).is_some()) {
            return Err(self.error(format!(
                "cannot access local '{name}' of an enclosing function"
            )));
        }
        Ok(None)
    }

    // Expressions

    /// Evaluate `exprs` to exactly `want` values
    fn expr_list_exact(&mut self, exprs: &[Expr], want: usize) -> GenResult<()> {
        let mut produced = 0;
        for (i, expr) in exprs.iter().enumerate() {
            let is_last = i + 1 == exprs.len();
            if is_last && expr.is_multi() {
                let nret = want.saturating_sub(i);
                let nret = self.count(nret, "values")?;
                self.call(expr, nret)?;
                produced += nret as usize;
            } else {
                self.expr(expr)?;
                produced += 1;
            }
        }
        if produced > want {
            let extra = self.count(produced - want, "values")?;
            self.emit_u8(OpCode::Pop, extra);
        }
        for _ in produced..want {
            self.emit(OpCode::Nil);
        }
        Ok(())
    }

    /// Evaluate `exprs`, letting a trailing call produce every value.
    /// Returns the fixed count and whether a variable tail follows.
    fn expr_list_open(&mut self, exprs: &[Expr]) -> GenResult<(usize, bool)> {
        for (i, expr) in exprs.iter().enumerate() {
            if i + 1 == exprs.len() && expr.is_multi() {
                self.call(expr, MULTRET)?;
                return Ok((i, true));
            }
            self.expr(expr)?;
        }
        Ok((exprs.len(), false))
    }

    /// Compile a call expression producing `nret` results
    fn call(&mut self, expr: &Expr, nret: u8) -> GenResult<()> {
        self.fs().line = expr.line;
        let (fixed, variable) = match &expr.kind {
            ExprKind::Call { func, args } => {
                self.expr(func)?;
                self.fs().line = expr.line;
                self.expr_list_open(args)?
            }
            ExprKind::Method { obj, name, args } => {
                self.expr(obj)?;
                self.fs().line = expr.line;
                let k = self.string_constant(name)?;
                self.emit_u16(OpCode::Method, k);
                let (fixed, variable) = self.expr_list_open(args)?;
                (fixed + 1, variable)
            }
            _ => return Err(self.error("call expected")),
        };
        self.fs().line = expr.line;
        let fixed = self.count(fixed, "arguments")?;
        let op = if variable { OpCode::CallVar } else { OpCode::Call };
        self.emit_u8u8(op, fixed, nret);
        Ok(())
    }

    /// Compile `expr` to exactly one value on the operand stack
    fn expr(&mut self, expr: &Expr) -> GenResult<()> {
        self.enter_level()?;
        let result = self.expr_code(expr);
        self.depth -= 1;
        result
    }

    fn expr_code(&mut self, expr: &Expr) -> GenResult<()> {
        self.fs().line = expr.line;
        match &expr.kind {
            ExprKind::Nil => self.emit(OpCode::Nil),
            ExprKind::True => self.emit(OpCode::True),
            ExprKind::False => self.emit(OpCode::False),
            ExprKind::Integer(i) => self.push_constant(Constant::Integer(*i))?,
            ExprKind::Float(n) => self.push_constant(Constant::Number(*n))?,
            ExprKind::Str(s) => self.push_constant(Constant::Str(s.to_string()))?,
            ExprKind::Function(body) => self.function(body)?,
            ExprKind::Table(fields) => self.table(fields)?,
            ExprKind::Name(name) => self.load_name(name)?,
            ExprKind::Index { obj, key } => {
                self.expr(obj)?;
                if let ExprKind::Str(field) = &key.kind {
                    let k = self.string_constant(field)?;
                    self.emit_u16(OpCode::GetField, k);
                } else {
                    self.expr(key)?;
                    self.emit(OpCode::GetIndex);
                }
            }
            ExprKind::Call { .. } | ExprKind::Method { .. } => self.call(expr, 1)?,
            ExprKind::Paren(inner) => self.expr(inner)?,
            ExprKind::Unary { op, operand } => match (op, &operand.kind) {
                (UnOp::Neg, ExprKind::Integer(i)) => {
                    self.push_constant(Constant::Integer(i.wrapping_neg()))?
                }
                (UnOp::Neg, ExprKind::Float(n)) => self.push_constant(Constant::Number(-n))?,
                _ => {
                    self.expr(operand)?;
                    self.fs().line = expr.line;
                    self.emit(match op {
                        UnOp::Neg => OpCode::Neg,
                        UnOp::Not => OpCode::Not,
                        UnOp::Len => OpCode::Len,
                    });
                }
            },
            ExprKind::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs, expr.line)?,
        }
        Ok(())
    }

    fn binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr, line: u32) -> GenResult<()> {
        self.expr(lhs)?;
        if matches!(op, BinOp::And | BinOp::Or) {
            let jump = if op == BinOp::And {
                OpCode::JumpIfFalseOrPop
            } else {
                OpCode::JumpIfTrueOrPop
            };
            self.fs().line = line;
            let skip = self.emit_jump(jump);
            self.expr(rhs)?;
            return self.patch_here(skip);
        }
        self.expr(rhs)?;
        self.fs().line = line;
        self.emit(match op {
            BinOp::Lt => OpCode::Less,
            BinOp::Gt => OpCode::Greater,
            BinOp::Le => OpCode::LessEqual,
            BinOp::Ge => OpCode::GreaterEqual,
            BinOp::Ne => OpCode::NotEqual,
            BinOp::Eq => OpCode::Equal,
            BinOp::Concat => OpCode::Concat,
            BinOp::Add => OpCode::Add,
            BinOp::Sub => OpCode::Sub,
            BinOp::Mul => OpCode::Mul,
            BinOp::Div => OpCode::Div,
            BinOp::IDiv => OpCode::IDiv,
            BinOp::Mod => OpCode::Mod,
            BinOp::Pow => OpCode::Pow,
            BinOp::And | BinOp::Or => OpCode::Nop,
        });
        Ok(())
    }

    fn table(&mut self, fields: &[Field]) -> GenResult<()> {
        self.emit(OpCode::NewTable);
        let mut next_index: i64 = 1;
        for (i, field) in fields.iter().enumerate() {
            match field {
                Field::Positional(value) if i + 1 == fields.len() && value.is_multi() => {
                    self.call(value, MULTRET)?;
                    let start = u16::try_from(next_index)
                        .map_err(|_| self.error("table constructor too long"))?;
                    self.emit_u16(OpCode::SetList, start);
                }
                Field::Positional(value) => {
                    self.emit(OpCode::Dup);
                    self.push_constant(Constant::Integer(next_index))?;
                    self.expr(value)?;
                    self.emit(OpCode::SetIndex);
                    next_index += 1;
                }
                Field::Named(name, value) => {
                    self.emit(OpCode::Dup);
                    self.expr(value)?;
                    let k = self.string_constant(name)?;
                    self.emit_u16(OpCode::SetField, k);
                }
                Field::Keyed(key, value) => {
                    self.emit(OpCode::Dup);
                    self.expr(key)?;
                    self.expr(value)?;
                    self.emit(OpCode::SetIndex);
                }
            }
        }
        Ok(())
    }

    /// Compile a nested function and push it as a closure
    fn function(&mut self, body: &FuncBody) -> GenResult<()> {
        self.funcs.push(FuncState::new(&body.name, body.line));
        let num_params = self.count(body.params.len(), "parameters")?;
        let first = self.alloc_slots(body.params.len())?;
        for (i, param) in body.params.iter().enumerate() {
            self.activate(param.clone(), first + i as u8);
        }
        self.fs().proto.num_params = num_params;
        self.block(&body.body)?;
        self.emit_u8(OpCode::Return, 0);
        let proto = self.finish()?;

        let index = self.fs_ref().proto.protos.len();
        let index = u16::try_from(index).map_err(|_| self.error("too many nested functions"))?;
        self.fs().proto.protos.push(proto);
        self.fs().line = body.line;
        self.emit_u16(OpCode::Closure, index);
        Ok(())
    }
}
