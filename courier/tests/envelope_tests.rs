/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

use courier::prelude::*;

use crate::setup::payloads::{Command, PriceQuery};

mod setup;

/// The wire form is the codec varint followed by the payload bytes.
#[test]
fn test_json_envelope_wire_form() -> anyhow::Result<()> {
    let envelope = Envelope::json(&Command::Add(3))?;
    let wire = envelope.encode();
    assert_eq!(&wire[..2], &[0x80, 0x04]);
    assert_eq!(wire.len(), envelope.encoded_len());

    let decoded = Envelope::decode(&wire)?;
    assert_eq!(decoded.codec_id(), codecs::JSON);
    assert!(matches!(decoded.decode_json::<Command>()?, Command::Add(3)));
    Ok(())
}

#[test]
fn test_decode_json_checks_codec() {
    let envelope = Envelope::raw(b"{}".to_vec());
    assert_eq!(
        envelope.decode_json::<PriceQuery>().map(|_| ()),
        Err(CodecError::CodecMismatch {
            expected: codecs::JSON,
            actual: codecs::RAW,
        })
    );

    let garbage = Envelope::new(codecs::JSON, b"not json".to_vec());
    assert!(matches!(
        garbage.decode_json::<PriceQuery>(),
        Err(CodecError::Serialization(_))
    ));
}

#[test]
fn test_truncated_varint() {
    assert_eq!(Envelope::decode(&[0x80]), Err(CodecError::Truncated));
    assert_eq!(Envelope::decode(&[]), Err(CodecError::Truncated));
}
