// crates/portico-rpc/src/schema.rs
//
// Protobuf file descriptors for hand-written messages.
//
// Messages in this crate are prost structs without .proto sources, so the
// descriptors that standard reflection serves are assembled here. A ProtoFile
// is built next to the messages it describes and attached to the MethodTable
// by the same registration that adds the handlers.

use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, FieldDescriptorProto, FileDescriptorProto, MethodDescriptorProto, ServiceDescriptorProto,
};

use crate::descriptor::MethodDescriptor;

/// Builder for one proto3 file.
#[derive(Debug, Clone)]
pub struct ProtoFile {
    file: FileDescriptorProto,
}

impl ProtoFile {
    /// `name` is the file path clients see (e.g. `platform/v1/platform.proto`).
    pub fn new(name: &str, package: &str) -> Self {
        Self {
            file: FileDescriptorProto {
                name: Some(name.to_string()),
                package: Some(package.to_string()),
                syntax: Some("proto3".to_string()),
                ..Default::default()
            },
        }
    }

    /// Add a message. `name` is relative to the package.
    pub fn message(mut self, name: &str, fields: Vec<FieldDescriptorProto>) -> Self {
        self.file.message_type.push(DescriptorProto {
            name: Some(name.to_string()),
            field: fields,
            ..Default::default()
        });
        self
    }

    /// Add a service whose methods are `methods`. The service name is taken
    /// from the first descriptor, minus the package.
    pub fn service(mut self, methods: &[MethodDescriptor]) -> Self {
        let Some(first) = methods.first() else {
            return self;
        };
        let name = first.service.rsplit('.').next().unwrap_or(first.service);
        self.file.service.push(ServiceDescriptorProto {
            name: Some(name.to_string()),
            method: methods
                .iter()
                .map(|m| MethodDescriptorProto {
                    name: Some(m.method.to_string()),
                    input_type: Some(qualified(m.input_type)),
                    output_type: Some(qualified(m.output_type)),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        });
        self
    }

    pub fn build(self) -> FileDescriptorProto {
        self.file
    }
}

/// Field constructors.
pub mod field {
    use super::*;

    pub fn string(name: &str, number: i32) -> FieldDescriptorProto {
        scalar(name, number, Type::String)
    }

    pub fn uint64(name: &str, number: i32) -> FieldDescriptorProto {
        scalar(name, number, Type::Uint64)
    }

    /// Singular message field; `type_name` is fully qualified without the
    /// leading dot.
    pub fn message(name: &str, number: i32, type_name: &str) -> FieldDescriptorProto {
        FieldDescriptorProto {
            type_name: Some(qualified(type_name)),
            ..scalar(name, number, Type::Message)
        }
    }

    pub fn repeated_message(name: &str, number: i32, type_name: &str) -> FieldDescriptorProto {
        FieldDescriptorProto {
            label: Some(Label::Repeated as i32),
            ..message(name, number, type_name)
        }
    }

    fn scalar(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
        FieldDescriptorProto {
            name: Some(name.to_string()),
            number: Some(number),
            label: Some(Label::Optional as i32),
            r#type: Some(ty as i32),
            json_name: Some(json_name(name)),
            ..Default::default()
        }
    }
}

fn qualified(type_name: &str) -> String {
    format!(".{}", type_name.trim_start_matches('.'))
}

/// protoc's lowerCamelCase rendering of a field name.
fn json_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Message and service type names in `file` that are referenced but not
/// declared in it. Used by tests to keep descriptors in step with messages.
pub fn unresolved_types(file: &FileDescriptorProto) -> Vec<String> {
    let package = file.package();
    let declared: Vec<String> = file
        .message_type
        .iter()
        .map(|m| format!(".{}.{}", package, m.name()))
        .collect();

    let referenced = file
        .message_type
        .iter()
        .flat_map(|m| m.field.iter())
        .filter(|f| f.r#type() == Type::Message)
        .map(|f| f.type_name().to_string())
        .chain(
            file.service
                .iter()
                .flat_map(|s| s.method.iter())
                .flat_map(|m| [m.input_type().to_string(), m.output_type().to_string()]),
        );

    let mut missing: Vec<String> = referenced.filter(|name| !declared.contains(name)).collect();
    missing.sort();
    missing.dedup();
    missing
}
