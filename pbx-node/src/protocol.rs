//  Copyright 2024. The PBX Switch Project
//
//  Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
//  following conditions are met:
//
//  1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
//  disclaimer.
//
//  2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
//  following disclaimer in the documentation and/or other materials provided with the distribution.
//
//  3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
//  products derived from this software without specific prior written permission.
//
//  THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
//  INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
//  DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
//  SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
//  SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
//  WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
//  USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! Parses one CRLF-terminated line into a [`Command`].

use pbx_core::ExtNum;

/// A parsed client command. `line` never carries the trailing `\r\n`; that is stripped by
/// the connection reader before parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Pickup,
    Hangup,
    /// A malformed or out-of-range extension is represented as `ExtNum::MAX`, which the
    /// registry can never allocate — it is handled identically to dialing an extension
    /// nobody has registered.
    Dial(ExtNum),
    Chat(String),
    /// An unrecognized line: silently ignored beyond the current-state notification every
    /// operation already sends.
    Unrecognized,
}

pub fn parse(line: &str) -> Command {
    let line = line.trim_end_matches(['\r', '\n']);
    let (token, rest) = match line.split_once(' ') {
        Some((token, rest)) => (token, rest),
        None => (line, ""),
    };
    match token {
        "pickup" => Command::Pickup,
        "hangup" => Command::Hangup,
        "dial" => Command::Dial(rest.trim().parse::<ExtNum>().unwrap_or(ExtNum::MAX)),
        "chat" => Command::Chat(rest.to_string()),
        _ => Command::Unrecognized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_commands() {
        assert_eq!(parse("pickup"), Command::Pickup);
        assert_eq!(parse("hangup\r\n"), Command::Hangup);
    }

    #[test]
    fn parses_dial_with_extension() {
        assert_eq!(parse("dial 7"), Command::Dial(7));
    }

    #[test]
    fn malformed_dial_extension_maps_to_unrepresentable_extension() {
        assert_eq!(parse("dial banana"), Command::Dial(ExtNum::MAX));
        assert_eq!(parse("dial"), Command::Dial(ExtNum::MAX));
    }

    #[test]
    fn chat_payload_is_the_literal_remainder_and_may_be_empty() {
        assert_eq!(parse("chat hello there"), Command::Chat("hello there".to_string()));
        assert_eq!(parse("chat"), Command::Chat(String::new()));
        assert_eq!(parse("chat "), Command::Chat(String::new()));
    }

    #[test]
    fn unrecognized_lines_are_ignored() {
        assert_eq!(parse("frobnicate"), Command::Unrecognized);
        assert_eq!(parse(""), Command::Unrecognized);
    }
}
