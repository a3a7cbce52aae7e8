// Copyright 2025 httprpc Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # httprpc CLI
//!
//! Command-line front end for the httprpc client.
//!
//! ## Architecture
//!
//! The CLI uses the `argh` crate for argument parsing and builds one
//! [`HttpRpcClient`](httprpc_client::HttpRpcClient) per invocation from the
//! optional `--config` file, the `-n` nameservers and the `-s` static
//! registrations.
//!
//! ## Key Commands
//!
//! - `httprpc call`: invoke a service once and print the response body
//! - `httprpc resolve`: print the addresses the nameserver reports
//! - `httprpc watch`: keep services synced and log their address sets

pub mod setup;
pub mod watch;
