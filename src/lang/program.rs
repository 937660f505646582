//! Compiled instruction stream
//!
//! The compiler lowers validated statements into a newline-delimited text
//! file of `Opcode:Payload` instructions; the executor reads that file back.
//! This is the only channel between the two phases, so serialization must
//! round-trip exactly.

use std::fmt;
use std::path::Path;

use crate::catalog::{Constraint, DataType};
use crate::error::{Error, Result};
use crate::storage::files;

/// One instruction of the compiled program.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    CreateSchema {
        schema: String,
    },
    CreateRelation {
        schema: String,
        relation: String,
    },
    /// Followed by one `CreateAttribute` per attribute.
    CreateRelationAttributes {
        relation: String,
    },
    CreateAttribute {
        name: String,
        data_type: DataType,
        constraint: Constraint,
    },
    /// Followed by one `AddArgument` per attribute, in declared order.
    AddRelation {
        relation: String,
    },
    AddArgument {
        value: String,
    },
    /// Followed by `Where` and `Set`.
    UpdateRelation {
        relation: String,
    },
    /// Followed by `Where`.
    DeleteRelation {
        relation: String,
    },
    Where {
        expression: String,
    },
    Set {
        expression: String,
    },
    /// Declares a result array; the following `FetchRelation` blocks fill it.
    Array {
        name: String,
    },
    FetchRelation {
        relation: String,
    },
    FetchAttribute {
        attribute: String,
    },
    Concatenate {
        operand: String,
    },
    Show {
        relation: String,
    },
    ShowSchema {
        schema: String,
    },
    ShowArray {
        array: String,
    },
}

impl Instruction {
    /// Parse one `Opcode:Payload` line. The payload is split on the first
    /// `:` only, since `where` expressions may themselves contain colons.
    pub fn parse(line: &str) -> Result<Self> {
        let (opcode, payload) = line
            .split_once(':')
            .ok_or_else(|| Error::MalformedInstruction(line.to_string()))?;

        let malformed = || Error::MalformedInstruction(line.to_string());

        let instruction = match opcode {
            "createSchema" => Instruction::CreateSchema {
                schema: payload.to_string(),
            },
            "createRelation" => {
                let (schema, relation) = payload.split_once(',').ok_or_else(&malformed)?;
                Instruction::CreateRelation {
                    schema: schema.to_string(),
                    relation: relation.to_string(),
                }
            }
            "createRelationAttributes" => Instruction::CreateRelationAttributes {
                relation: payload.to_string(),
            },
            "createAttribute" => {
                let mut parts = payload.splitn(3, ',');
                let name = parts.next().ok_or_else(&malformed)?;
                let data_type = parts.next().ok_or_else(&malformed)?;
                let constraint = parts.next().ok_or_else(&malformed)?;
                Instruction::CreateAttribute {
                    name: name.to_string(),
                    data_type: DataType::parse(data_type)?,
                    constraint: Constraint::parse(constraint)?,
                }
            }
            "addRelation" => Instruction::AddRelation {
                relation: payload.to_string(),
            },
            "addArgument" => Instruction::AddArgument {
                value: payload.to_string(),
            },
            "updateRelation" => Instruction::UpdateRelation {
                relation: payload.to_string(),
            },
            "deleteRelation" => Instruction::DeleteRelation {
                relation: payload.to_string(),
            },
            "where" => Instruction::Where {
                expression: payload.to_string(),
            },
            "set" => Instruction::Set {
                expression: payload.to_string(),
            },
            "array" => Instruction::Array {
                name: payload.to_string(),
            },
            "fetchRelation" => Instruction::FetchRelation {
                relation: payload.to_string(),
            },
            "fetchAttribute" => Instruction::FetchAttribute {
                attribute: payload.to_string(),
            },
            "concatenate" => Instruction::Concatenate {
                operand: payload.to_string(),
            },
            "show" => Instruction::Show {
                relation: payload.to_string(),
            },
            "showSchema" => Instruction::ShowSchema {
                schema: payload.to_string(),
            },
            "showArray" => Instruction::ShowArray {
                array: payload.to_string(),
            },
            _ => return Err(Error::UnknownOpcode(opcode.to_string())),
        };

        Ok(instruction)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::CreateSchema { schema } => write!(f, "createSchema:{}", schema),
            Instruction::CreateRelation { schema, relation } => {
                write!(f, "createRelation:{},{}", schema, relation)
            }
            Instruction::CreateRelationAttributes { relation } => {
                write!(f, "createRelationAttributes:{}", relation)
            }
            Instruction::CreateAttribute {
                name,
                data_type,
                constraint,
            } => write!(f, "createAttribute:{},{},{}", name, data_type, constraint),
            Instruction::AddRelation { relation } => write!(f, "addRelation:{}", relation),
            Instruction::AddArgument { value } => write!(f, "addArgument:{}", value),
            Instruction::UpdateRelation { relation } => write!(f, "updateRelation:{}", relation),
            Instruction::DeleteRelation { relation } => write!(f, "deleteRelation:{}", relation),
            Instruction::Where { expression } => write!(f, "where:{}", expression),
            Instruction::Set { expression } => write!(f, "set:{}", expression),
            Instruction::Array { name } => write!(f, "array:{}", name),
            Instruction::FetchRelation { relation } => write!(f, "fetchRelation:{}", relation),
            Instruction::FetchAttribute { attribute } => {
                write!(f, "fetchAttribute:{}", attribute)
            }
            Instruction::Concatenate { operand } => write!(f, "concatenate:{}", operand),
            Instruction::Show { relation } => write!(f, "show:{}", relation),
            Instruction::ShowSchema { schema } => write!(f, "showSchema:{}", schema),
            Instruction::ShowArray { array } => write!(f, "showArray:{}", array),
        }
    }
}

/// A compiled program: the ordered instruction stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    instructions: Vec<Instruction>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Write the program file, overwriting any previous build.
    pub fn store(&self, path: impl AsRef<Path>) -> Result<()> {
        let lines: Vec<String> = self.instructions.iter().map(|i| i.to_string()).collect();
        files::write_all_lines(path, &lines)
    }

    /// Load a program file. Blank lines are not expected from the builder
    /// and are rejected as malformed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut program = Program::new();
        for line in files::read_all_lines(path)? {
            program.push(Instruction::parse(&line)?);
        }
        Ok(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display_round_trip() {
        let lines = [
            "createSchema:University",
            "createRelation:University,Student",
            "createRelationAttributes:Student",
            "createAttribute:id,int,PK",
            "createAttribute:name,varchar(20),NOT NULL",
            "addRelation:Student",
            "addArgument:1",
            "addArgument:Alice",
            "updateRelation:Student",
            "where:id == 1",
            "set:name = \"Carol\"",
            "deleteRelation:Student",
            "where:id == 1",
            "array:arr",
            "fetchRelation:Student",
            "fetchAttribute:name",
            "concatenate:!",
            "show:Student",
            "showSchema:University",
            "showArray:arr",
        ];

        for line in lines {
            let instruction = Instruction::parse(line).unwrap();
            assert_eq!(instruction.to_string(), line, "round trip of {}", line);
        }
    }

    #[test]
    fn test_where_payload_keeps_colons() {
        let instruction = Instruction::parse("where:stamp == \"2024-01-01 10:00:00\"").unwrap();
        match instruction {
            Instruction::Where { expression } => {
                assert_eq!(expression, "stamp == \"2024-01-01 10:00:00\"");
            }
            other => panic!("unexpected instruction {:?}", other),
        }
    }

    #[test]
    fn test_unknown_opcode() {
        assert!(matches!(
            Instruction::parse("explode:now"),
            Err(Error::UnknownOpcode(_))
        ));
        assert!(matches!(
            Instruction::parse("no separator"),
            Err(Error::MalformedInstruction(_))
        ));
    }

    #[test]
    fn test_typed_attribute_payload() {
        let instruction = Instruction::parse("createAttribute:id,char(4),NOT NULL").unwrap();
        match instruction {
            Instruction::CreateAttribute {
                name,
                data_type,
                constraint,
            } => {
                assert_eq!(name, "id");
                assert_eq!(data_type, DataType::Char(4));
                assert_eq!(constraint, Constraint::NotNull);
            }
            other => panic!("unexpected instruction {:?}", other),
        }
    }

    #[test]
    fn test_store_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("program");

        let mut program = Program::new();
        program.push(Instruction::CreateSchema {
            schema: "S".to_string(),
        });
        program.push(Instruction::Show {
            relation: "R".to_string(),
        });
        program.store(&path).unwrap();

        let loaded = Program::load(&path).unwrap();
        assert_eq!(loaded, program);
    }
}
