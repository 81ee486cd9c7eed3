pub mod error;
pub mod spirv;

use error::Result;
use quill_ir::Program;

pub struct Compiler;

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Compiler
    }

    /// Lower a typed program to SPIR-V words
    pub fn compile(&self, program: &Program) -> Result<Vec<u32>> {
        spirv::SpirvCodeGenerator::new(program).generate()
    }

    /// Lower a typed program to the bytes of a `.spv` file
    pub fn compile_to_bytes(&self, program: &Program) -> Result<Vec<u8>> {
        let words = self.compile(program)?;
        Ok(spirv::words_to_bytes(&words))
    }
}
