use super::SpirvCodeGenerator;
use crate::error::Result;
use log::debug;
use quill_ir::{Expression, Statement, StmtKind, VarDeclaration};
use rspirv::spirv::{LoopControl, SelectionControl, StorageClass, Word};

impl SpirvCodeGenerator<'_> {
    pub(crate) fn lower_statement(&mut self, stmt: &Statement) -> Result<()> {
        match &stmt.kind {
            StmtKind::Block(statements) => {
                for (i, statement) in statements.iter().enumerate() {
                    if !self.encoder.is_live() {
                        debug!(
                            "Skipping {} unreachable statement(s) at {}",
                            statements.len() - i,
                            statement.position
                        );
                        break;
                    }
                    self.lower_statement(statement)?;
                }
            }
            StmtKind::Expression(expr) => {
                self.lower_expression(expr)?;
            }
            StmtKind::VarDeclarations(declarations) => self.lower_var_declarations(declarations)?,
            StmtKind::If {
                test,
                if_true,
                if_false,
            } => self.lower_if(test, if_true, if_false.as_deref())?,
            StmtKind::For {
                initializer,
                test,
                next,
                body,
            } => {
                if let Some(initializer) = initializer {
                    self.lower_statement(initializer)?;
                }
                self.lower_for(test.as_ref(), next.as_ref(), body)?;
            }
            StmtKind::While { test, body } => {
                if self.while_loops_enabled(stmt, "while") {
                    self.lower_while(test, body)?;
                }
            }
            StmtKind::Do { body, test } => {
                if self.while_loops_enabled(stmt, "do-while") {
                    self.lower_do(body, test)?;
                }
            }
            StmtKind::Break => {
                let Some(&target) = self.break_targets.last() else {
                    panic!("break outside of a loop at {}", stmt.position);
                };
                self.encoder.builder.branch(target)?;
            }
            StmtKind::Continue => {
                let Some(&target) = self.continue_targets.last() else {
                    panic!("continue outside of a loop at {}", stmt.position);
                };
                self.encoder.builder.branch(target)?;
            }
            StmtKind::Discard => self.encoder.builder.kill()?,
            StmtKind::Return(Some(value)) => {
                let value = self.lower_expression(value)?;
                self.encoder.builder.ret_value(value)?;
            }
            StmtKind::Return(None) => self.encoder.builder.ret()?,
        }
        Ok(())
    }

    fn lower_var_declarations(&mut self, declarations: &[VarDeclaration]) -> Result<()> {
        let program = self.program;
        for declaration in declarations {
            let variable = program.variable(declaration.var);
            let pointer_type = self.get_pointer_type(&variable.ty, StorageClass::Function);
            let id = self.encoder.local_variable(pointer_type)?;
            self.variables.insert(declaration.var, id);
            self.write_name(id, &variable.name);
            if let Some(value) = &declaration.value {
                let value = self.lower_expression(value)?;
                self.encoder.builder.store(id, value, None, [])?;
            }
        }
        Ok(())
    }

    /// `while`/`do` lowering is opt-in; otherwise the loop is reported and
    /// nothing is emitted for it.
    fn while_loops_enabled(&mut self, stmt: &Statement, what: &str) -> bool {
        if self.program.settings.enable_while_loops {
            return true;
        }
        self.errors.unsupported(
            stmt.position,
            format!("{} loops are not supported by the SPIR-V back end", what),
        );
        false
    }

    fn lower_if(
        &mut self,
        test: &Expression,
        if_true: &Statement,
        if_false: Option<&Statement>,
    ) -> Result<()> {
        let test = self.lower_expression(test)?;
        let true_label = self.next_id();
        let false_label = self.next_id();
        match if_false {
            Some(if_false) => {
                let end = self.next_id();
                self.encoder
                    .builder
                    .selection_merge(end, SelectionControl::NONE)?;
                self.encoder
                    .builder
                    .branch_conditional(test, true_label, false_label, [])?;
                self.write_label(true_label)?;
                self.lower_statement(if_true)?;
                self.branch_if_live(end)?;
                self.write_label(false_label)?;
                self.lower_statement(if_false)?;
                self.branch_if_live(end)?;
                self.write_label(end)
            }
            None => {
                self.encoder
                    .builder
                    .selection_merge(false_label, SelectionControl::NONE)?;
                self.encoder
                    .builder
                    .branch_conditional(test, true_label, false_label, [])?;
                self.write_label(true_label)?;
                self.lower_statement(if_true)?;
                self.branch_if_live(false_label)?;
                self.write_label(false_label)
            }
        }
    }

    fn branch_if_live(&mut self, target: Word) -> Result<()> {
        if self.encoder.is_live() {
            self.encoder.builder.branch(target)?;
        }
        Ok(())
    }

    /// Branches to a fresh loop header and declares the loop's merge and
    /// continue blocks there.
    fn begin_loop(&mut self, header: Word, end: Word, continue_target: Word) -> Result<()> {
        self.encoder.builder.branch(header)?;
        self.write_label(header)?;
        self.encoder
            .builder
            .loop_merge(end, continue_target, LoopControl::NONE, [])?;
        Ok(())
    }

    /// header -> test -> body -> continue -> header, leaving through `end`.
    fn lower_for(
        &mut self,
        test: Option<&Expression>,
        next: Option<&Expression>,
        body: &Statement,
    ) -> Result<()> {
        let header = self.next_id();
        let start = self.next_id();
        let body_label = self.next_id();
        let next_label = self.next_id();
        let end = self.next_id();
        self.begin_loop(header, end, next_label)?;
        self.encoder.builder.branch(start)?;
        self.write_label(start)?;
        match test {
            Some(test) => {
                let test = self.lower_expression(test)?;
                self.encoder
                    .builder
                    .branch_conditional(test, body_label, end, [])?;
            }
            None => self.encoder.builder.branch(body_label)?,
        }
        self.write_label(body_label)?;
        self.lower_loop_body(body, end, next_label)?;
        self.write_label(next_label)?;
        if let Some(next) = next {
            self.lower_expression(next)?;
        }
        self.encoder.builder.branch(header)?;
        self.write_label(end)
    }

    fn lower_loop_body(
        &mut self,
        body: &Statement,
        break_target: Word,
        continue_target: Word,
    ) -> Result<()> {
        self.break_targets.push(break_target);
        self.continue_targets.push(continue_target);
        let lowered = self.lower_statement(body);
        self.break_targets.pop();
        self.continue_targets.pop();
        lowered?;
        self.branch_if_live(continue_target)
    }

    fn lower_while(&mut self, test: &Expression, body: &Statement) -> Result<()> {
        let header = self.next_id();
        let start = self.next_id();
        let body_label = self.next_id();
        let continue_label = self.next_id();
        let end = self.next_id();
        self.begin_loop(header, end, continue_label)?;
        self.encoder.builder.branch(start)?;
        self.write_label(start)?;
        let test = self.lower_expression(test)?;
        self.encoder
            .builder
            .branch_conditional(test, body_label, end, [])?;
        self.write_label(body_label)?;
        self.lower_loop_body(body, end, continue_label)?;
        self.write_label(continue_label)?;
        self.encoder.builder.branch(header)?;
        self.write_label(end)
    }

    /// The test lives in the continue block so `continue` re-evaluates it.
    fn lower_do(&mut self, body: &Statement, test: &Expression) -> Result<()> {
        let header = self.next_id();
        let body_label = self.next_id();
        let continue_label = self.next_id();
        let end = self.next_id();
        self.begin_loop(header, end, continue_label)?;
        self.encoder.builder.branch(body_label)?;
        self.write_label(body_label)?;
        self.lower_loop_body(body, end, continue_label)?;
        self.write_label(continue_label)?;
        let test = self.lower_expression(test)?;
        self.encoder
            .builder
            .branch_conditional(test, header, end, [])?;
        self.write_label(end)
    }
}
