// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

pub mod add;
pub mod cat;
pub mod files;
pub mod get;
pub mod init;
pub mod name;

pub use add::{AddOptions, add_command};
pub use cat::cat_command;
pub use files::{FilesCommand, files_command};
pub use get::get_command;
pub use init::init_command;
pub use name::{NameCommand, name_command};
