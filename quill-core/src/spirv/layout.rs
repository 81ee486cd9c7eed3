//! std140 / std430 size, alignment and stride rules used for uniform and
//! push-constant block member offsets.

use quill_ir::{ScalarKind, Type, TypeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayoutStd {
    Std140,
    Std430,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryLayout {
    pub std: LayoutStd,
}

impl MemoryLayout {
    pub const STD140: MemoryLayout = MemoryLayout {
        std: LayoutStd::Std140,
    };
    pub const STD430: MemoryLayout = MemoryLayout {
        std: LayoutStd::Std430,
    };

    fn vector_alignment(component_size: usize, columns: usize) -> usize {
        component_size * (columns + columns % 2)
    }

    /// std140 rounds array and struct alignment up to that of a vec4.
    fn round_up_if_needed(&self, raw: usize) -> usize {
        match self.std {
            LayoutStd::Std140 => (raw + 15) & !15,
            LayoutStd::Std430 => raw,
        }
    }

    fn scalar_size(kind: ScalarKind) -> usize {
        match kind {
            ScalarKind::Double => 8,
            _ => 4,
        }
    }

    pub fn alignment(&self, ty: &Type) -> usize {
        match &ty.kind {
            TypeKind::Scalar(kind) => Self::scalar_size(*kind),
            TypeKind::Vector { component, size } => {
                Self::vector_alignment(Self::scalar_size(*component), *size as usize)
            }
            TypeKind::Matrix { component, rows, .. } => self.round_up_if_needed(
                Self::vector_alignment(Self::scalar_size(*component), *rows as usize),
            ),
            TypeKind::Array { element, .. } => self.round_up_if_needed(self.alignment(element)),
            TypeKind::Struct { fields } => {
                let result = fields
                    .iter()
                    .map(|field| self.alignment(&field.ty))
                    .max()
                    .unwrap_or(1);
                self.round_up_if_needed(result)
            }
            _ => panic!("cannot determine alignment of type '{}'", ty),
        }
    }

    /// Matrix column stride or array element stride.
    pub fn stride(&self, ty: &Type) -> usize {
        match &ty.kind {
            TypeKind::Matrix { component, rows, .. } => self.round_up_if_needed(
                Self::vector_alignment(Self::scalar_size(*component), *rows as usize),
            ),
            TypeKind::Array { element, .. } => {
                let align = self.alignment(element);
                let stride = align_to(self.size(element), align);
                self.round_up_if_needed(stride)
            }
            _ => panic!("type '{}' has no stride", ty),
        }
    }

    pub fn size(&self, ty: &Type) -> usize {
        match &ty.kind {
            TypeKind::Scalar(kind) => Self::scalar_size(*kind),
            TypeKind::Vector { component, size } => {
                *size as usize * Self::scalar_size(*component)
            }
            TypeKind::Matrix { columns, .. } => *columns as usize * self.stride(ty),
            TypeKind::Array { len, .. } => len.unwrap_or(0) as usize * self.stride(ty),
            TypeKind::Struct { fields } => {
                let mut total = 0;
                for field in fields {
                    total = align_to(total, self.alignment(&field.ty));
                    total += self.size(&field.ty);
                }
                align_to(total, self.alignment(ty))
            }
            _ => panic!("cannot determine size of type '{}'", ty),
        }
    }
}

pub fn align_to(offset: usize, alignment: usize) -> usize {
    match offset % alignment {
        0 => offset,
        rem => offset + alignment - rem,
    }
}
