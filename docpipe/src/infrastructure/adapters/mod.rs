// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Adapters for the external collaborator ports: object stores, the AI
//! service stub, and alert channels.

pub mod ai_stub;
pub mod alert_channels;
pub mod object_store;

pub use ai_stub::StubAiService;
pub use alert_channels::{CollectingAlertChannel, LogAlertChannel};
pub use object_store::{FilesystemObjectStore, InMemoryObjectStore};
