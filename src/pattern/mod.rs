//-
// Copyright (c) 2024, Jason Lingle
//
// This file is part of Mailpat.
//
// Mailpat is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Mailpat is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Mailpat. If not, see <http://www.gnu.org/licenses/>.

//! The mail pattern language.
//!
//! A pattern such as `~f boss ~d <3d` is compiled (`compile`) into a
//! `Pattern` tree, which is then evaluated against individual messages of a
//! `MessageView` (`eval`). `search` and `func` build the interactive search
//! and the bulk operations on top of those.

pub mod compile;
pub mod date;
pub mod eval;
pub mod func;
pub mod model;
pub mod range;
pub mod search;
pub mod simple;
pub mod token;
pub mod view;
