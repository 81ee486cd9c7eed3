//! SPIR-V back end.
//!
//! `SpirvCodeGenerator` walks a `Program` once: it pre-assigns function ids,
//! then lowers interface blocks, global variables and function bodies into
//! an `rspirv` module, which is assembled into words at the end.

mod constants;
pub mod encoder;
mod expr;
mod globals;
pub mod intrinsics;
pub mod layout;
mod lvalue;
mod stmt;
mod types;

#[cfg(test)]
mod expr_tests;

use crate::bail_spirv;
use crate::error::{CompilerError, ErrorReporter, Result};
use encoder::Encoder;
use indexmap::{IndexMap, IndexSet};
use intrinsics::IntrinsicRegistry;
use layout::MemoryLayout;
use log::{debug, info};
use quill_ir::{
    Expression, FuncId, FunctionDeclaration, FunctionDefinition, Program, ProgramElement,
    ProgramKind, Storage, VarId,
};
use rspirv::binary::{parse_bytes, Assemble};
use rspirv::dr::{Loader, Module, Operand};
use rspirv::spirv::{
    AddressingModel, Capability, ExecutionMode, ExecutionModel, MemoryModel, Op, StorageClass,
    Word,
};
use std::collections::HashMap;

pub use constants::ConstantCache;
pub use globals::storage_class;
pub use lvalue::LValue;
pub use types::TypeCache;

/// Generator magic number written into the module header.
pub const GENERATOR_MAGIC: Word = 0;

/// Location of the render target height used to flip the fragment
/// coordinate's Y axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtHeight {
    pub variable: Word,
    pub field_index: u32,
    pub storage_class: StorageClass,
}

pub struct SpirvCodeGenerator<'a> {
    program: &'a Program,
    encoder: Encoder,
    types: TypeCache,
    constants: ConstantCache,
    intrinsics: IntrinsicRegistry,
    capabilities: IndexSet<Capability>,
    glsl_ext_inst: Word,
    function_ids: HashMap<FuncId, Word>,
    // Insertion ordered so the entry point interface is deterministic
    variables: IndexMap<VarId, Word>,
    rt_height: Option<RtHeight>,
    break_targets: Vec<Word>,
    continue_targets: Vec<Word>,
    // Stores lowered at the top of main
    global_initializers: Vec<(Word, &'a Expression)>,
    default_layout: MemoryLayout,
    errors: ErrorReporter,
}

impl<'a> SpirvCodeGenerator<'a> {
    pub fn new(program: &'a Program) -> Self {
        let mut encoder = Encoder::new();
        let glsl_ext_inst = encoder.builder.ext_inst_import("GLSL.std.450");
        let mut capabilities = IndexSet::new();
        capabilities.insert(Capability::Shader);
        SpirvCodeGenerator {
            program,
            encoder,
            types: TypeCache::default(),
            constants: ConstantCache::default(),
            intrinsics: IntrinsicRegistry::new(),
            capabilities,
            glsl_ext_inst,
            function_ids: HashMap::new(),
            variables: IndexMap::new(),
            rt_height: None,
            break_targets: Vec::new(),
            continue_targets: Vec::new(),
            global_initializers: Vec::new(),
            default_layout: MemoryLayout::STD140,
            errors: ErrorReporter::new(),
        }
    }

    pub fn next_id(&mut self) -> Word {
        self.encoder.next_id()
    }

    pub fn errors(&self) -> &ErrorReporter {
        &self.errors
    }

    pub fn rt_height(&self) -> Option<RtHeight> {
        self.rt_height
    }

    pub fn require_capability(&mut self, capability: Capability) {
        self.capabilities.insert(capability);
    }

    /// Push constants use std430, everything else the default layout.
    pub fn layout_for(&self, storage_class: StorageClass) -> MemoryLayout {
        match storage_class {
            StorageClass::PushConstant => MemoryLayout::STD430,
            _ => self.default_layout,
        }
    }

    /// Appends `op` over id operands to the open block and returns its
    /// result.
    fn emit_value(&mut self, op: Op, result_type: Word, operands: &[Word]) -> Result<Word> {
        let operands = operands.iter().map(|&id| Operand::IdRef(id)).collect();
        self.encoder.emit_value(op, result_type, operands)
    }

    fn write_label(&mut self, label: Word) -> Result<()> {
        self.encoder.begin_block(label)
    }

    fn write_name(&mut self, target: Word, name: &str) {
        self.encoder.builder.name(target, name);
    }

    fn variable_pointer(&self, var: VarId) -> Word {
        match self.variables.get(&var) {
            Some(&id) => id,
            None => panic!(
                "variable '{}' used before it was declared",
                self.program.variable(var).name
            ),
        }
    }

    /// Opens the function `id` with its parameters and entry block, and
    /// returns the entry label.
    fn begin_function(&mut self, declaration: &FunctionDeclaration, id: Word) -> Result<Word> {
        let program = self.program;
        let return_type = self.get_type(&declaration.return_type);
        let function_type = self.get_function_type(declaration);
        self.encoder.begin_function(return_type, id, function_type)?;
        self.write_name(id, &declaration.name);
        for &param in &declaration.parameters {
            let variable = program.variable(param);
            let ty = self.get_pointer_type(&variable.ty, StorageClass::Function);
            let param_id = self.encoder.builder.function_parameter(ty)?;
            self.variables.insert(param, param_id);
            self.write_name(param_id, &variable.name);
        }
        let entry = self.next_id();
        self.write_label(entry)?;
        Ok(entry)
    }

    fn write_function(&mut self, function: &FunctionDefinition) -> Result<()> {
        let program = self.program;
        let declaration = program.function(function.declaration);
        let id = self.function_ids[&function.declaration];
        debug!("Lowering function '{}' (id {})", declaration.name, id);

        self.begin_function(declaration, id)?;
        if declaration.name == "main" {
            for (variable, value) in std::mem::take(&mut self.global_initializers) {
                let value = self.lower_expression(value)?;
                self.encoder.builder.store(variable, value, None, [])?;
            }
        }
        self.lower_statement(&function.body)?;

        if self.encoder.is_live() {
            if declaration.return_type.is_void() {
                self.encoder.builder.ret()?;
            } else {
                self.encoder.builder.unreachable()?;
            }
        }
        self.encoder.builder.end_function()?;
        Ok(())
    }

    /// Lowers the whole program and returns the module's words.
    ///
    /// Recoverable errors are collected while lowering continues; if any
    /// were reported the partial module is dropped and they are returned
    /// together.
    pub fn generate(mut self) -> Result<Vec<Word>> {
        let program = self.program;

        for element in &program.elements {
            if let ProgramElement::Function(function) = element {
                let id = self.next_id();
                self.function_ids.insert(function.declaration, id);
            }
        }
        for element in &program.elements {
            if let ProgramElement::InterfaceBlock(block) = element {
                self.write_interface_block(block);
            }
        }
        for element in &program.elements {
            if let ProgramElement::Var(declarations) = element {
                self.write_global_vars(declarations);
            }
        }
        for element in &program.elements {
            if let ProgramElement::Function(function) = element {
                self.write_function(function)?;
            }
        }

        let main = program.elements.iter().find_map(|element| match element {
            ProgramElement::Function(function)
                if program.function(function.declaration).name == "main" =>
            {
                Some(self.function_ids[&function.declaration])
            }
            _ => None,
        });

        let SpirvCodeGenerator {
            encoder,
            capabilities,
            variables,
            errors,
            ..
        } = self;
        errors.into_result()?;
        let Some(main) = main else {
            bail_spirv!("program has no main function");
        };

        let interface: Vec<Word> = variables
            .iter()
            .filter(|(var, _)| {
                let variable = program.variable(**var);
                variable.storage == Storage::Global
                    && (variable.modifiers.is_in || variable.modifiers.is_out)
            })
            .map(|(_, &id)| id)
            .collect();

        let mut builder = encoder.builder;
        for capability in capabilities {
            builder.capability(capability);
        }
        builder.memory_model(AddressingModel::Logical, MemoryModel::GLSL450);
        let model = match program.kind {
            ProgramKind::Vertex => ExecutionModel::Vertex,
            ProgramKind::Fragment => ExecutionModel::Fragment,
        };
        builder.entry_point(model, main, "main", &interface);
        if program.kind == ProgramKind::Fragment {
            builder.execution_mode(main, ExecutionMode::OriginUpperLeft, []);
        }
        for element in &program.elements {
            if let ProgramElement::Extension(name) = element {
                builder.source_extension(name.as_str());
            }
        }

        let mut module = builder.module();
        let bound = module.header.as_mut().map_or(0, |header| {
            header.generator = GENERATOR_MAGIC;
            header.bound
        });
        let words = module.assemble();
        info!(
            "Generated SPIR-V module: {} words, bound {}, {} interface variables",
            words.len(),
            bound,
            interface.len()
        );
        Ok(words)
    }
}

/// Little-endian byte image of a module, as written to a `.spv` file.
pub fn words_to_bytes(words: &[Word]) -> Vec<u8> {
    words.iter().flat_map(|word| word.to_le_bytes()).collect()
}

/// Parses a generated module back into rspirv's data representation.
pub fn load_module(words: &[Word]) -> Result<Module> {
    let bytes = words_to_bytes(words);
    let mut loader = Loader::new();
    parse_bytes(&bytes, &mut loader)
        .map_err(|e| CompilerError::SpirvError(format!("Failed to parse SPIR-V: {:?}", e), None))?;
    Ok(loader.module())
}
