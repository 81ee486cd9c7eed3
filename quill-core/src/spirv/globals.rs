use super::layout::MemoryLayout;
use super::{RtHeight, SpirvCodeGenerator};
use log::debug;
use quill_ir::{
    Builtin, Field, InterfaceBlock, ProgramKind, Storage, Type, TypeKind, VarDeclaration,
    Variable,
};
use rspirv::spirv::{Decoration, StorageClass};

/// Storage class a variable lives in, chosen from where it is declared and
/// its modifiers.
pub fn storage_class(variable: &Variable) -> StorageClass {
    match variable.storage {
        Storage::Local | Storage::Parameter => StorageClass::Function,
        Storage::Global => {
            let modifiers = &variable.modifiers;
            if modifiers.is_in {
                StorageClass::Input
            } else if modifiers.is_out {
                StorageClass::Output
            } else if modifiers.is_uniform {
                if modifiers.layout.push_constant {
                    StorageClass::PushConstant
                } else if variable.ty.is_sampler() {
                    StorageClass::UniformConstant
                } else {
                    StorageClass::Uniform
                }
            } else {
                StorageClass::Private
            }
        }
    }
}

impl<'a> SpirvCodeGenerator<'a> {
    pub(crate) fn write_interface_block(&mut self, block: &InterfaceBlock) {
        let program = self.program;
        let variable = program.variable(block.variable);
        let layout = if variable.modifiers.layout.push_constant {
            MemoryLayout::STD430
        } else {
            self.default_layout
        };
        let mut ty = variable.ty.clone();
        // The first block of a program that asks for it carries the render
        // target height as an extra trailing member
        let carries_rt_height = program.inputs.rt_height && self.rt_height.is_none();
        if carries_rt_height {
            let TypeKind::Struct { fields } = &mut ty.kind else {
                panic!("interface block '{}' is not a struct", variable.name);
            };
            fields.push(Field::new("rt_height", Type::float()));
        }
        debug!(
            "Writing interface block '{}' of type '{}' ({} members)",
            variable.name,
            ty,
            ty.fields().len()
        );
        let type_id = self.get_type_with_layout(&ty, layout);
        self.decorate(type_id, Decoration::Block, &[]);
        let storage_class = storage_class(variable);
        let pointer = self.get_pointer_type_with_layout(&ty, layout, storage_class);
        let id = self.encoder.global_variable(pointer, storage_class);
        if carries_rt_height {
            self.rt_height = Some(RtHeight {
                variable: id,
                field_index: ty.fields().len() as u32 - 1,
                storage_class,
            });
        }
        let layout = variable.modifiers.layout;
        self.write_layout(&layout, id);
        self.write_name(id, &variable.name);
        self.variables.insert(block.variable, id);
    }

    /// Declares the globals of one declaration statement. Initializers are
    /// queued and run at the top of `main`.
    pub(crate) fn write_global_vars(&mut self, declarations: &'a [VarDeclaration]) {
        let program = self.program;
        for declaration in declarations {
            let variable = program.variable(declaration.var);
            let modifiers = &variable.modifiers;
            match modifiers.layout.builtin {
                Some(Builtin::Ignore) => continue,
                Some(Builtin::FragColor) if program.kind != ProgramKind::Fragment => continue,
                _ => {}
            }
            let is_interface = modifiers.is_in || modifiers.is_out || modifiers.is_uniform;
            if !variable.is_read_from && !variable.is_written_to && !is_interface {
                debug!("Skipping unused global '{}'", variable.name);
                continue;
            }
            let storage_class = storage_class(variable);
            let pointer = self.get_pointer_type(&variable.ty, storage_class);
            let id = self.encoder.global_variable(pointer, storage_class);
            self.variables.insert(declaration.var, id);
            self.write_name(id, &variable.name);
            self.write_layout(&modifiers.layout, id);

            if let Some(value) = &declaration.value {
                self.global_initializers.push((id, value));
            }
        }
    }

    /// The uniform block holding the render target height, created on first
    /// use when no interface block already carries it.
    pub(crate) fn rt_height_uniform(&mut self) -> RtHeight {
        if let Some(rt_height) = self.rt_height {
            return rt_height;
        }
        let settings = &self.program.settings;
        let (binding, set) = (settings.rt_height_binding, settings.rt_height_set);
        let ty = Type::structure(
            "synthetic_uniforms",
            vec![Field::new("rt_height", Type::float())],
        );
        let type_id = self.get_type(&ty);
        self.decorate(type_id, Decoration::Block, &[]);
        let pointer = self.get_pointer_type(&ty, StorageClass::Uniform);
        let id = self.encoder.global_variable(pointer, StorageClass::Uniform);
        self.write_name(id, "synthetic_uniforms");
        self.decorate(id, Decoration::Binding, &[binding]);
        if let Some(set) = set {
            self.decorate(id, Decoration::DescriptorSet, &[set]);
        }
        debug!(
            "Created synthetic uniform block for the render target height (binding {}, set {:?})",
            binding, set
        );
        let rt_height = RtHeight {
            variable: id,
            field_index: 0,
            storage_class: StorageClass::Uniform,
        };
        self.rt_height = Some(rt_height);
        rt_height
    }
}
