//! Command-line front end for configuring a CANopen node
//!
//! # yacc
//!
//! Connects to one node over socketcan and runs a single command against it:
//!
//! - `yacc read 0x2100 0` reads one object and prints every view of its value
//! - `yacc write 0x1A00 1 0x60000108` writes one object, suspending the PDO it configures
//! - `yacc upload -f node.dcf` reads every object of the object dictionary into a DCF
//! - `yacc download -f node.dcf --save` writes a DCF to the node, then stores it
//! - `yacc groups` and `yacc entries <group>` list the object dictionary
//!
//! The bus and node are described by a TOML file passed with `--config`; every setting in it can
//! be overridden on the command line.

pub mod command;
pub mod report;
