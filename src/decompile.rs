//! Register-VM decompiler
//!
//! One decompiler instance walks one prototype's instruction stream
//! and rebuilds pseudo-source. The central idea is that the register
//! file is simulated as a map from register index to *expression
//! text*: arithmetic, table reads, concatenations and constant loads
//! fold into the map silently, and actual statements are emitted only
//! at opcodes with observable effects (writes to locals, globals and
//! tables, calls, conditionals, returns). Lexical structure is
//! recovered from the test-and-jump pairs the Lua 5.1 compiler emits:
//! a forward jump opens an `if` or `while` scope, a backward jump
//! closes a `repeat` block whose `repeat` line is inserted
//! retroactively. Output is collected as an ordered list of lines,
//! each tagged with the pc range it covers and its scope depth, and
//! rendered with indentation at the end.
//!
//! Nested prototypes are decompiled by a fresh instance at the parent
//! `CLOSURE` site and spliced back in as an expression.

use std::collections::{BTreeMap, HashMap};
use std::mem;

use itertools::Itertools;
use thiserror::Error;

use crate::chunk::{Chunk, Constant};
use crate::instr::Instr;
use crate::opcodes::{Opcode, LFIELDS_PER_FLUSH};
use crate::undump::ImageError;
use crate::utils::{is_rk_constant, rk_to_constant_index};

#[derive(Debug, Error)]
pub enum DecompileError {
    #[error("unsupported opcode {op:?} at pc {pc}")]
    UnsupportedOpcode { op: Opcode, pc: usize },
    #[error("decompiler invariant violated: {0}")]
    DecompilerInvariant(String),
    #[error("{0}")]
    Image(ImageError),
}

impl From<ImageError> for DecompileError {
    fn from(e: ImageError) -> Self {
        Self::Image(e)
    }
}

/// Per-instance knobs; all default to the conservative setting
#[derive(Debug, Clone)]
pub struct DecompileOptions {
    /// Promote every written non-local register to a fresh local
    pub aggressive_locals: bool,
    /// Precede each output line with a `-- PC: s to e` comment line
    pub annotate_lines: bool,
    /// Spaces per scope level
    pub indent_width: usize,
}

impl Default for DecompileOptions {
    fn default() -> Self {
        Self {
            aggressive_locals: false,
            annotate_lines: false,
            indent_width: 4,
        }
    }
}

/// Check every operand that indexes the constant pool or the child
/// prototype list before any decompilation state is built. Runs over
/// the whole tree.
pub fn validate(chunk: &Chunk) -> Result<(), ImageError> {
    let num_constants = chunk.constants.len() as u32;
    let rk_in_range = |v: u32| !is_rk_constant(v) || rk_to_constant_index(v) < num_constants;
    for (pc, instr) in chunk.instructions.iter().enumerate() {
        if instr.op.bx_is_constant() && instr.b() >= num_constants {
            return Err(ImageError::MalformedImage(format!(
                "constant index {} out of range at pc {pc}",
                instr.b()
            )));
        }
        if instr.op == Opcode::CLOSURE && instr.b() as usize >= chunk.protos.len() {
            return Err(ImageError::MalformedImage(format!(
                "child prototype index {} out of range at pc {pc}",
                instr.b()
            )));
        }
        let bad_rk = if instr.op.uses_rk_bc() {
            !rk_in_range(instr.b()) || !rk_in_range(instr.c())
        } else if instr.op.uses_rk_c() {
            !rk_in_range(instr.c())
        } else {
            false
        };
        if bad_rk {
            return Err(ImageError::MalformedImage(format!(
                "RK operand indexes a missing constant at pc {pc}"
            )));
        }
    }
    for proto in &chunk.protos {
        validate(proto)?;
    }
    Ok(())
}

/// Decompile a prototype tree to pseudo-source
pub fn decompile(chunk: &Chunk, options: &DecompileOptions) -> Result<String, DecompileError> {
    validate(chunk)?;
    Decompiler::new(chunk, options, true, 0).run()
}

/// An open lexical scope and where it was opened; closes once the pc
/// passes end_pc
struct Scope {
    start_pc: usize,
    end_pc: usize,
}

/// Registers written and read while emitting the instruction at one pc
#[derive(Default)]
struct Traceback {
    sets: Vec<u32>,
    uses: Vec<u32>,
}

/// One output line: its text, the pc range it covers, and the scope
/// depth it renders at
struct Line {
    start_pc: usize,
    end_pc: usize,
    text: String,
    depth: usize,
}

struct Decompiler<'a> {
    chunk: &'a Chunk,
    options: &'a DecompileOptions,
    pc: usize,
    /// Expression currently materialised at each register
    top: HashMap<u32, String>,
    /// Identifier bound to each register
    locals: HashMap<u32, String>,
    traceback: BTreeMap<usize, Traceback>,
    scopes: Vec<Scope>,
    lines: Vec<Line>,
    /// Statement under construction, flushed at the next boundary
    buf: String,
    /// Depth captured when the buffered statement began
    pending_depth: usize,
    last_end_pc: Option<usize>,
    /// False for nested prototypes, which render as function(...)
    /// expressions rather than top-level source
    head_chunk: bool,
    /// Extra indentation inherited from the enclosing prototype
    scope_offset: usize,
}

fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl<'a> Decompiler<'a> {
    fn new(
        chunk: &'a Chunk,
        options: &'a DecompileOptions,
        head_chunk: bool,
        scope_offset: usize,
    ) -> Self {
        Self {
            chunk,
            options,
            pc: 0,
            top: HashMap::new(),
            locals: HashMap::new(),
            traceback: BTreeMap::new(),
            scopes: Vec::new(),
            lines: Vec::new(),
            buf: String::new(),
            pending_depth: 0,
            last_end_pc: None,
            head_chunk,
            scope_offset,
        }
    }

    fn run(mut self) -> Result<String, DecompileError> {
        self.load_locals();
        if !self.head_chunk {
            self.open_function_scope();
        }
        while self.pc < self.chunk.instructions.len() {
            self.instr()?;
            self.pc += 1;
            self.close_finished_scopes();
        }
        self.flush_line();
        while !self.scopes.is_empty() {
            self.end_scope();
        }
        if self.head_chunk {
            Ok(self.render())
        } else {
            Ok(self.render_inline())
        }
    }

    // ---- identifiers --------------------------------------------------

    /// Bind debug-info names to their registers. Names invented by the
    /// compiler for numeric-for control variables start with "(for "
    /// and are skipped; anything that is not a valid identifier is
    /// left for lazy generation.
    fn load_locals(&mut self) {
        for (i, local) in self.chunk.locals.iter().enumerate() {
            let name = local.name_str();
            if name.starts_with("(for ") {
                continue;
            }
            if is_valid_identifier(&name) {
                self.locals.insert(i as u32, name.into_owned());
            }
        }
    }

    /// The identifier for a register, generating one on first use. The
    /// generated name is keyed by the register index, so a register
    /// keeps one identifier for the whole prototype.
    fn make_local_identifier(&mut self, r: u32) -> String {
        self.locals
            .entry(r)
            .or_insert_with(|| format!("__unknLocal{r}"))
            .clone()
    }

    // ---- traceback ----------------------------------------------------

    fn add_use(&mut self, r: u32) {
        self.traceback.entry(self.pc).or_default().uses.push(r);
    }

    fn add_set(&mut self, r: u32) {
        self.traceback.entry(self.pc).or_default().sets.push(r);
    }

    /// A local needs a `local` declaration if no earlier emission
    /// wrote its register
    fn needs_defined(&self, r: u32) -> bool {
        !self.traceback.values().any(|t| t.sets.contains(&r))
    }

    // ---- register file ------------------------------------------------

    fn reg(&mut self, r: u32) -> Result<String, DecompileError> {
        self.add_use(r);
        if let Some(name) = self.locals.get(&r) {
            return Ok(name.clone());
        }
        if let Some(expr) = self.top.get(&r) {
            return Ok(expr.clone());
        }
        Err(DecompileError::DecompilerInvariant(format!(
            "register {r} read before it was written at pc {}",
            self.pc
        )))
    }

    fn set_reg(&mut self, r: u32, code: String) {
        if self.locals.contains_key(&r) {
            if self.needs_defined(r) {
                self.new_local(r, &code);
            } else {
                let name = self.locals[&r].clone();
                self.start_statement();
                self.add_expr(&format!("{name} = {code}"));
            }
        } else if self.options.aggressive_locals {
            self.new_local(r, &code);
        }
        self.add_set(r);
        self.top.insert(r, code);
    }

    fn new_local(&mut self, r: u32, expr: &str) {
        let name = self.make_local_identifier(r);
        self.start_statement();
        self.add_expr(&format!("local {name} = {expr}"));
    }

    /// Commit a computed expression to a register as a local, whether
    /// or not a name was bound beforehand (used for table literals)
    fn force_local(&mut self, r: u32, code: String) {
        self.new_local(r, &code);
        self.add_set(r);
        self.top.insert(r, code);
    }

    // ---- constants ----------------------------------------------------

    fn konst(&self, index: u32) -> Result<&Constant, DecompileError> {
        self.chunk.constants.get(index as usize).ok_or_else(|| {
            DecompileError::DecompilerInvariant(format!(
                "constant index {index} out of range at pc {}",
                self.pc
            ))
        })
    }

    fn global_name(&self, index: u32) -> Result<String, DecompileError> {
        match self.konst(index)? {
            Constant::Str(bytes) => Ok(String::from_utf8_lossy(bytes).into_owned()),
            other => Err(DecompileError::DecompilerInvariant(format!(
                "global name at pc {} is not a string constant ({other})",
                self.pc
            ))),
        }
    }

    /// An RK operand: constant-pool literal when bit 8 is set, the
    /// current register expression otherwise
    fn read_rk(&mut self, v: u32) -> Result<String, DecompileError> {
        if is_rk_constant(v) {
            Ok(self.konst(rk_to_constant_index(v))?.to_code())
        } else {
            self.reg(v)
        }
    }

    // ---- line buffer --------------------------------------------------

    fn add_expr(&mut self, code: &str) {
        self.buf.push_str(code);
    }

    fn push_line(&mut self, text: String, depth: usize, start_pc: usize) {
        let end_pc = self
            .pc
            .min(self.chunk.instructions.len().saturating_sub(1));
        self.lines.push(Line {
            start_pc,
            end_pc,
            text,
            depth,
        });
        self.last_end_pc = Some(end_pc);
    }

    fn flush_line(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let text = mem::take(&mut self.buf);
        let start_pc = self.last_end_pc.map_or(0, |pc| pc + 1);
        let depth = self.pending_depth;
        self.push_line(text, depth, start_pc);
    }

    /// Flush the previous statement and begin a new one at the current
    /// depth
    fn start_statement(&mut self) {
        self.flush_line();
        self.pending_depth = self.scopes.len();
    }

    // ---- scopes -------------------------------------------------------

    /// Append the scope opener to the current statement and open a
    /// scope covering the next `length` instructions
    fn start_scope(&mut self, opener: &str, length: usize) {
        self.add_expr(opener);
        self.scopes.push(Scope {
            start_pc: self.pc,
            end_pc: self.pc + length,
        });
    }

    fn close_finished_scopes(&mut self) {
        while let Some(scope) = self.scopes.last() {
            if self.pc > scope.end_pc {
                self.end_scope();
            } else {
                break;
            }
        }
    }

    fn end_scope(&mut self) {
        if let Some(scope) = self.scopes.pop() {
            self.flush_line();
            let depth = self.scopes.len();
            self.push_line("end".to_string(), depth, scope.start_pc);
        }
    }

    /// Nested prototypes render as a function literal: parameters are
    /// locals that exist before any instruction runs
    fn open_function_scope(&mut self) {
        let params: Vec<String> = (0..u32::from(self.chunk.num_params))
            .map(|r| self.make_local_identifier(r))
            .collect();
        for r in 0..u32::from(self.chunk.num_params) {
            self.add_set(r);
        }
        self.start_statement();
        self.add_expr(&format!("function({})", params.iter().join(", ")));
        self.scopes.push(Scope {
            start_pc: 0,
            end_pc: self.chunk.instructions.len(),
        });
    }

    /// Retroactively insert a `repeat` line after the instruction at
    /// `target`, indenting everything past it by one level
    fn insert_repeat(&mut self, target: usize) {
        let index = self
            .lines
            .iter()
            .position(|line| line.start_pc > target)
            .unwrap_or(self.lines.len());
        let depth = self
            .lines
            .get(index)
            .map_or(self.scopes.len(), |line| line.depth);
        for line in &mut self.lines[index..] {
            line.depth += 1;
        }
        self.lines.insert(
            index,
            Line {
                start_pc: target,
                end_pc: target,
                text: "repeat".to_string(),
                depth,
            },
        );
    }

    // ---- control flow -------------------------------------------------

    /// Handle a test opcode together with the jump that must follow
    /// it. The jump direction and target classify the construct:
    /// backward closes a `repeat`, a forward jump whose landing
    /// instruction jumps back opens a `while`, anything else an `if`.
    fn cond_jump(&mut self, cond: String, negate: bool) -> Result<(), DecompileError> {
        let next = *self.instr_at(self.pc + 1)?;
        if next.op != Opcode::JMP {
            return Err(DecompileError::DecompilerInvariant(format!(
                "test at pc {} is not followed by a jump",
                self.pc
            )));
        }
        let not = if negate { "not " } else { "" };
        let jmp = next.sbx() + 1;

        if jmp < 0 {
            let target = self.pc as i64 + i64::from(jmp);
            if target < 0 {
                return Err(DecompileError::DecompilerInvariant(format!(
                    "backward jump at pc {} escapes the prototype",
                    self.pc + 1
                )));
            }
            self.flush_line();
            self.insert_repeat(target as usize);
            self.start_statement();
            self.add_expr(&format!("until {not}{cond}"));
            self.pc += 1;
            return Ok(());
        }

        let jmp = jmp as usize;
        let (kind, opener) = match self.chunk.instructions.get(self.pc + jmp) {
            Some(at_end)
                if at_end.op == Opcode::JMP
                    && (self.pc + jmp) as i64 + i64::from(at_end.sbx())
                        <= self.pc as i64 + 1 =>
            {
                ("while", "do")
            }
            _ => ("if", "then"),
        };
        self.start_statement();
        self.add_expr(&format!("{kind} {not}{cond} "));
        self.start_scope(opener, jmp);
        self.pc += 1;
        Ok(())
    }

    fn cond_jump_comparison(&mut self, instr: Instr, op: &str) -> Result<(), DecompileError> {
        let lhs = self.read_rk(instr.b())?;
        let rhs = self.read_rk(instr.c())?;
        self.cond_jump(format!("({lhs}{op}{rhs})"), instr.a > 0)
    }

    /// `for v = init, limit, step do`: the three control registers were
    /// populated by the preceding writes; the loop variable lives three
    /// registers above them
    fn numeric_for(&mut self, instr: Instr) -> Result<(), DecompileError> {
        let a = instr.a;
        let sbx = instr.sbx();
        if sbx < 0 {
            return Err(DecompileError::DecompilerInvariant(format!(
                "numeric-for prep at pc {} jumps backwards",
                self.pc
            )));
        }
        let loop_var = self.make_local_identifier(a + 3);
        self.add_set(a + 3);
        let init = self.reg(a)?;
        let limit = self.reg(a + 1)?;
        let step = self.reg(a + 2)?;
        self.start_statement();
        self.add_expr(&format!("for {loop_var} = {init}, {limit}, {step} "));
        self.start_scope("do", sbx as usize);
        Ok(())
    }

    // ---- statements ---------------------------------------------------

    fn fold_binary(&mut self, instr: Instr, op: &str) -> Result<(), DecompileError> {
        let lhs = self.read_rk(instr.b())?;
        let rhs = self.read_rk(instr.c())?;
        self.set_reg(instr.a, format!("({lhs}{op}{rhs})"));
        Ok(())
    }

    fn call(&mut self, instr: Instr) -> Result<(), DecompileError> {
        let (a, b, c) = (instr.a, instr.b(), instr.c());
        let callee = self.reg(a)?;
        let args = (a + 1..a + b)
            .map(|r| self.reg(r))
            .collect::<Result<Vec<_>, _>>()?;
        let call = format!("{callee}({})", args.iter().join(", "));

        // C-1 results land in the registers from A upward and become
        // locals bound in one declaration
        let prefix = if c > 1 {
            let names: Vec<String> = (a..a + c - 1)
                .map(|r| {
                    let name = self.make_local_identifier(r);
                    self.top.insert(r, name.clone());
                    name
                })
                .collect();
            format!("local {} = ", names.iter().join(", "))
        } else {
            String::new()
        };
        self.start_statement();
        self.add_expr(&format!("{prefix}{call}"));
        Ok(())
    }

    /// A NEWTABLE followed by LOADK/SETLIST runs fuses into one
    /// aggregate literal; the literal is committed when any other
    /// opcode appears
    fn table_literal(&mut self, instr: Instr) -> Result<(), DecompileError> {
        let a = instr.a;
        let mut cached: BTreeMap<u32, String> = BTreeMap::new();
        let mut items: Vec<String> = Vec::new();
        let mut scan = self.pc + 1;
        while let Some(next) = self.chunk.instructions.get(scan) {
            match next.op {
                Opcode::LOADK => {
                    let code = self.konst(next.b())?.to_code();
                    cached.insert(next.a, code);
                }
                Opcode::SETLIST => {
                    for _ in 0..next.b() {
                        match cached.pop_first() {
                            Some((_, value)) => items.push(value),
                            None => {
                                return Err(DecompileError::DecompilerInvariant(format!(
                                    "table flush at pc {scan} wants more values than were loaded"
                                )))
                            }
                        }
                    }
                }
                _ => break,
            }
            scan += 1;
        }

        let mut literal = String::from("{");
        for item in &items {
            literal.push_str(item);
            literal.push_str(", ");
        }
        literal.push('}');
        self.force_local(a, literal);
        self.pc = scan - 1;
        Ok(())
    }

    /// A SETLIST outside a fused table literal writes batch entries
    /// index by index; batch c covers indices (c-1)*50+1 onward
    fn setlist_statements(&mut self, instr: Instr) -> Result<(), DecompileError> {
        let (a, b, c) = (instr.a, instr.b(), instr.c());
        if c == 0 {
            return Err(DecompileError::DecompilerInvariant(format!(
                "SETLIST at pc {} takes its batch number from the next word",
                self.pc
            )));
        }
        let table = self.reg(a)?;
        let base = (c - 1) * LFIELDS_PER_FLUSH;
        for offset in 1..=b {
            let value = self.reg(a + offset)?;
            self.start_statement();
            self.add_expr(&format!("{table}[{}] = {value}", base + offset));
        }
        Ok(())
    }

    /// Decompile a child prototype in place and assign the function
    /// expression to the target register
    fn closure(&mut self, instr: Instr) -> Result<(), DecompileError> {
        let proto = self
            .chunk
            .protos
            .get(instr.b() as usize)
            .ok_or_else(|| {
                DecompileError::DecompilerInvariant(format!(
                    "child prototype index {} out of range at pc {}",
                    instr.b(),
                    self.pc
                ))
            })?;
        let offset = self.scope_offset + self.scopes.len();
        let body = Decompiler::new(proto, self.options, false, offset).run()?;
        self.set_reg(instr.a, body);
        // the following num_upvals words are upvalue-binding operands
        self.pc += usize::from(proto.num_upvals);
        Ok(())
    }

    // ---- dispatch -----------------------------------------------------

    fn instr_at(&self, pc: usize) -> Result<&Instr, DecompileError> {
        self.chunk.instructions.get(pc).ok_or_else(|| {
            DecompileError::DecompilerInvariant(format!(
                "instruction fetch past the end of the prototype at pc {pc}"
            ))
        })
    }

    fn instr(&mut self) -> Result<(), DecompileError> {
        let instr = *self.instr_at(self.pc)?;
        let a = instr.a;
        match instr.op {
            Opcode::MOVE => {
                let src = self.reg(instr.b())?;
                self.set_reg(a, src);
            }
            Opcode::LOADK => {
                let code = self.konst(instr.b())?.to_code();
                self.set_reg(a, code);
            }
            Opcode::LOADBOOL => {
                // the C-as-skip form is not reconstructed
                let code = if instr.b() != 0 { "true" } else { "false" };
                self.set_reg(a, code.to_string());
            }
            Opcode::LOADNIL => {
                for r in a..=instr.b() {
                    self.set_reg(r, "nil".to_string());
                }
            }
            Opcode::GETGLOBAL => {
                let name = self.global_name(instr.b())?;
                self.set_reg(a, name);
            }
            Opcode::GETTABLE => {
                let table = self.reg(instr.b())?;
                let key = self.read_rk(instr.c())?;
                self.set_reg(a, format!("{table}[{key}]"));
            }
            Opcode::SETGLOBAL => {
                let name = self.global_name(instr.b())?;
                let value = self.reg(a)?;
                self.start_statement();
                self.add_expr(&format!("{name} = {value}"));
            }
            Opcode::SETTABLE => {
                let table = self.reg(a)?;
                let key = self.read_rk(instr.b())?;
                let value = self.read_rk(instr.c())?;
                self.start_statement();
                self.add_expr(&format!("{table}[{key}] = {value}"));
            }
            Opcode::ADD => self.fold_binary(instr, " + ")?,
            Opcode::SUB => self.fold_binary(instr, " - ")?,
            Opcode::MUL => self.fold_binary(instr, " * ")?,
            Opcode::DIV => self.fold_binary(instr, " / ")?,
            Opcode::MOD => self.fold_binary(instr, " % ")?,
            Opcode::POW => self.fold_binary(instr, " ^ ")?,
            Opcode::UNM => {
                let value = self.reg(instr.b())?;
                self.set_reg(a, format!("-{value}"));
            }
            Opcode::NOT => {
                let value = self.reg(instr.b())?;
                self.set_reg(a, format!("not {value}"));
            }
            Opcode::LEN => {
                let value = self.reg(instr.b())?;
                self.set_reg(a, format!("#{value}"));
            }
            Opcode::CONCAT => {
                let parts = (instr.b()..=instr.c())
                    .map(|r| self.reg(r))
                    .collect::<Result<Vec<_>, _>>()?;
                self.set_reg(a, parts.iter().join(" .. "));
            }
            Opcode::JMP => {}
            Opcode::EQ => self.cond_jump_comparison(instr, " == ")?,
            Opcode::LT => self.cond_jump_comparison(instr, " < ")?,
            Opcode::LE => self.cond_jump_comparison(instr, " <= ")?,
            Opcode::TEST => {
                let cond = self.reg(a)?;
                self.cond_jump(cond, instr.c() != 0)?;
            }
            Opcode::CALL => self.call(instr)?,
            Opcode::RETURN => {
                // return values are not rendered
                self.start_statement();
            }
            Opcode::FORLOOP => {}
            Opcode::FORPREP => self.numeric_for(instr)?,
            Opcode::NEWTABLE => self.table_literal(instr)?,
            Opcode::SETLIST => self.setlist_statements(instr)?,
            Opcode::CLOSURE => self.closure(instr)?,
            Opcode::GETUPVAL
            | Opcode::SETUPVAL
            | Opcode::SELF
            | Opcode::TESTSET
            | Opcode::TAILCALL
            | Opcode::TFORLOOP
            | Opcode::CLOSE
            | Opcode::VARARG => {
                return Err(DecompileError::UnsupportedOpcode {
                    op: instr.op,
                    pc: self.pc,
                });
            }
        }
        Ok(())
    }

    // ---- rendering ----------------------------------------------------

    fn indent(&self, depth: usize) -> String {
        " ".repeat((depth + self.scope_offset) * self.options.indent_width)
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            let indent = self.indent(line.depth);
            if self.options.annotate_lines {
                out.push_str(&format!(
                    "{indent}-- PC: {} to {}\n",
                    line.start_pc, line.end_pc
                ));
            }
            out.push_str(&indent);
            out.push_str(&line.text);
            out.push('\n');
        }
        out
    }

    /// Expression form for closures: the first line carries no indent
    /// because it lands after `= ` in the parent statement
    fn render_inline(&self) -> String {
        let mut out = String::new();
        for (i, line) in self.lines.iter().enumerate() {
            if i == 0 {
                out.push_str(&line.text);
                continue;
            }
            out.push('\n');
            let indent = self.indent(line.depth);
            if self.options.annotate_lines {
                out.push_str(&format!(
                    "{indent}-- PC: {} to {}\n",
                    line.start_pc, line.end_pc
                ));
            }
            out.push_str(&indent);
            out.push_str(&line.text);
        }
        out
    }
}
