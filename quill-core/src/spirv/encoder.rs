//! Instruction emission on top of `rspirv::dr::Builder`.
//!
//! Types, constants, names and decorations go straight into the module's
//! global sections, which are assembled in SPIR-V order at the end no matter
//! when lowering discovers them. Function code goes into the block the
//! builder has selected; a terminator closes it, so nothing can land after
//! one until the next label opens a block.

use crate::error::{CompilerError, Result};
use rspirv::dr::{self, Builder, InsertPoint, Instruction, Operand};
use spirv::{FunctionControl, Op, StorageClass, Word};

pub fn is_terminator(op: Op) -> bool {
    matches!(
        op,
        Op::Return
            | Op::ReturnValue
            | Op::Kill
            | Op::Branch
            | Op::BranchConditional
            | Op::Switch
            | Op::Unreachable
    )
}

pub struct Encoder {
    pub builder: Builder,
    /// Number of `OpVariable`s hoisted to the head of the entry block of
    /// the function being lowered
    locals: usize,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder {
    pub fn new() -> Self {
        let mut builder = Builder::new();
        builder.set_version(1, 0);
        Encoder { builder, locals: 0 }
    }

    pub fn next_id(&mut self) -> Word {
        self.builder.id()
    }

    pub fn begin_function(
        &mut self,
        return_type: Word,
        id: Word,
        function_type: Word,
    ) -> Result<()> {
        self.builder
            .begin_function(return_type, Some(id), FunctionControl::NONE, function_type)?;
        self.locals = 0;
        Ok(())
    }

    /// Opens the block labelled `label`. The previous block must have been
    /// terminated.
    pub fn begin_block(&mut self, label: Word) -> Result<()> {
        self.builder.begin_block(Some(label))?;
        Ok(())
    }

    /// True while a block is open and reachable code can be written.
    pub fn is_live(&self) -> bool {
        self.builder.selected_block().is_some()
    }

    /// Label of the open block.
    pub fn current_block(&self) -> Result<Word> {
        let label = match (self.builder.selected_function(), self.builder.selected_block()) {
            (Some(function), Some(block)) => {
                self.builder.module_ref().functions[function].blocks[block].label_id()
            }
            _ => None,
        };
        label.ok_or(CompilerError::SpirvBuilderError(
            dr::Error::DetachedInstruction(None),
        ))
    }

    /// Appends `inst` to the open block, closing the block if `inst` is a
    /// terminator.
    pub fn emit(&mut self, inst: Instruction) -> Result<()> {
        let terminates = is_terminator(inst.class.opcode);
        self.builder.insert_into_block(InsertPoint::End, inst)?;
        if terminates {
            self.builder.select_block(None)?;
        }
        Ok(())
    }

    /// Appends `op` with a fresh result id and returns that id.
    pub fn emit_value(
        &mut self,
        op: Op,
        result_type: Word,
        operands: Vec<Operand>,
    ) -> Result<Word> {
        let id = self.next_id();
        self.emit(Instruction::new(op, Some(result_type), Some(id), operands))?;
        Ok(id)
    }

    /// Declares a Function-storage variable. It is placed after the other
    /// locals at the head of the entry block, whichever block is open.
    pub fn local_variable(&mut self, pointer_type: Word) -> Result<Word> {
        let id = self.next_id();
        let current = self.builder.selected_block();
        self.builder.select_block(Some(0))?;
        self.builder.insert_into_block(
            InsertPoint::FromBegin(self.locals),
            Instruction::new(
                Op::Variable,
                Some(pointer_type),
                Some(id),
                vec![Operand::StorageClass(StorageClass::Function)],
            ),
        )?;
        self.builder.select_block(current)?;
        self.locals += 1;
        Ok(id)
    }

    /// Declares a module-scope variable.
    pub fn global_variable(&mut self, pointer_type: Word, storage_class: StorageClass) -> Word {
        let id = self.next_id();
        self.builder.insert_types_global_values(
            InsertPoint::End,
            Instruction::new(
                Op::Variable,
                Some(pointer_type),
                Some(id),
                vec![Operand::StorageClass(storage_class)],
            ),
        );
        id
    }
}

/// Parts of the module under construction, as tests inspect them.
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Names,
    Decorations,
    /// Types, constants and module-scope variables
    Constants,
    /// Locals of the last function begun
    Variables,
    /// Labels and code of the last function begun, without its locals
    Body,
}

#[cfg(test)]
impl Encoder {
    /// Assembled words of `section`.
    pub fn section(&self, section: Section) -> Vec<Word> {
        use rspirv::binary::Assemble;

        let module = self.builder.module_ref();
        let function = module.functions.last();
        let mut instructions: Vec<&Instruction> = Vec::new();
        match section {
            Section::Names => instructions.extend(&module.debug_names),
            Section::Decorations => instructions.extend(&module.annotations),
            Section::Constants => instructions.extend(&module.types_global_values),
            Section::Variables => {
                if let Some(entry) = function.and_then(|f| f.blocks.first()) {
                    instructions.extend(entry.instructions.iter().take(self.locals));
                }
            }
            Section::Body => {
                for (index, block) in function.iter().flat_map(|f| f.blocks.iter()).enumerate() {
                    instructions.extend(&block.label);
                    let skip = if index == 0 { self.locals } else { 0 };
                    instructions.extend(block.instructions.iter().skip(skip));
                }
            }
        }
        instructions
            .into_iter()
            .flat_map(|inst| inst.assemble())
            .collect()
    }
}
