//! Path hashing. Archives store no names, only the 64 bit CityHash of each
//! entry's path, so every lookup goes through [`hash_path`].
use core::mem;

use crate::Error;

const K0: u64 = 0xc3a5_c85c_97cb_3127;
const K1: u64 = 0xb492_b66f_be98_f273;
const K2: u64 = 0x9ae1_6a3b_2f90_404f;
const K3: u64 = 0xc949_d7c7_509e_6557;
const K_MUL: u64 = 0x9ddf_ea08_eb38_2d69;

/// Hash a logical archive path.
///
/// A single leading `/` is ignored. A nonzero salt is prepended as decimal
/// text, so salt 42 hashes `"42" + path`. Characters outside Latin-1 cannot
/// be represented in the single byte encoding the format uses.
pub fn hash_path(path: &str, salt: u16) -> Result<u64, Error> {
    let path = path.strip_prefix('/').unwrap_or(path);

    let mut bytes = Vec::with_capacity(path.len() + 5);
    if salt != 0 {
        bytes.extend_from_slice(salt.to_string().as_bytes());
    }
    for c in path.chars() {
        let byte = u8::try_from(u32::from(c)).map_err(|_| Error::InvalidPath(path.to_string()))?;
        bytes.push(byte);
    }

    Ok(city_hash64(&bytes))
}

/// CityHash64 as shipped in CityHash 1.0.x, which is the revision the
/// archive format was built against. Later revisions changed the
/// short input mixing and produce different values.
pub fn city_hash64(s: &[u8]) -> u64 {
    let len = s.len();
    if len <= 16 {
        return hash_len_0_to_16(s);
    } else if len <= 32 {
        return hash_len_17_to_32(s);
    } else if len <= 64 {
        return hash_len_33_to_64(s);
    }

    // For strings over 64 bytes we loop, keeping 56 bytes of state: v, w, x, y and z
    let mut x = fetch64(s, len - 40);
    let mut y = fetch64(s, len - 16).wrapping_add(fetch64(s, len - 56));
    let mut z = hash_len_16(fetch64(s, len - 48).wrapping_add(len as u64), fetch64(s, len - 24));
    let mut v = weak_hash_len_32_with_seeds(&s[len - 64..], len as u64, z);
    let mut w = weak_hash_len_32_with_seeds(&s[len - 32..], y.wrapping_add(K1), x);
    x = x.wrapping_mul(K1).wrapping_add(fetch64(s, 0));

    let mut remaining = (len - 1) & !63;
    let mut chunk = s;
    loop {
        x = x
            .wrapping_add(y)
            .wrapping_add(v.0)
            .wrapping_add(fetch64(chunk, 8))
            .rotate_right(37)
            .wrapping_mul(K1);
        y = y
            .wrapping_add(v.1)
            .wrapping_add(fetch64(chunk, 48))
            .rotate_right(42)
            .wrapping_mul(K1);
        x ^= w.1;
        y = y.wrapping_add(v.0).wrapping_add(fetch64(chunk, 40));
        z = z.wrapping_add(w.0).rotate_right(33).wrapping_mul(K1);
        v = weak_hash_len_32_with_seeds(chunk, v.1.wrapping_mul(K1), x.wrapping_add(w.0));
        w = weak_hash_len_32_with_seeds(
            &chunk[32..],
            z.wrapping_add(w.1),
            y.wrapping_add(fetch64(chunk, 16)),
        );
        mem::swap(&mut z, &mut x);

        chunk = &chunk[64..];
        remaining -= 64;
        if remaining == 0 {
            break;
        }
    }

    hash_len_16(
        hash_len_16(v.0, w.0)
            .wrapping_add(shift_mix(y).wrapping_mul(K1))
            .wrapping_add(z),
        hash_len_16(v.1, w.1).wrapping_add(x),
    )
}

fn fetch64(s: &[u8], i: usize) -> u64 {
    let mut bytes = [0; 8];
    bytes.copy_from_slice(&s[i..i + 8]);
    u64::from_le_bytes(bytes)
}

fn fetch32(s: &[u8], i: usize) -> u64 {
    let mut bytes = [0; 4];
    bytes.copy_from_slice(&s[i..i + 4]);
    u32::from_le_bytes(bytes) as u64
}

fn shift_mix(val: u64) -> u64 {
    val ^ (val >> 47)
}

/// Hash128to64 of the pair `(u, v)`
fn hash_len_16(u: u64, v: u64) -> u64 {
    let a = shift_mix((u ^ v).wrapping_mul(K_MUL));
    let b = shift_mix((v ^ a).wrapping_mul(K_MUL));
    b.wrapping_mul(K_MUL)
}

fn hash_len_0_to_16(s: &[u8]) -> u64 {
    let len = s.len();
    if len > 8 {
        let a = fetch64(s, 0);
        let b = fetch64(s, len - 8);
        // len is 9..=16 here, so the rotation is never by zero
        hash_len_16(a, b.wrapping_add(len as u64).rotate_right(len as u32)) ^ b
    } else if len >= 4 {
        let a = fetch32(s, 0);
        hash_len_16((len as u64).wrapping_add(a << 3), fetch32(s, len - 4))
    } else if len > 0 {
        let a = s[0] as u32;
        let b = s[len >> 1] as u32;
        let c = s[len - 1] as u32;
        let y = a + (b << 8);
        let z = len as u32 + (c << 2);
        shift_mix((y as u64).wrapping_mul(K2) ^ (z as u64).wrapping_mul(K3)).wrapping_mul(K2)
    } else {
        K2
    }
}

fn hash_len_17_to_32(s: &[u8]) -> u64 {
    let len = s.len();
    let a = fetch64(s, 0).wrapping_mul(K1);
    let b = fetch64(s, 8);
    let c = fetch64(s, len - 8).wrapping_mul(K2);
    let d = fetch64(s, len - 16).wrapping_mul(K0);
    hash_len_16(
        a.wrapping_sub(b)
            .rotate_right(43)
            .wrapping_add(c.rotate_right(30))
            .wrapping_add(d),
        a.wrapping_add((b ^ K3).rotate_right(20))
            .wrapping_sub(c)
            .wrapping_add(len as u64),
    )
}

fn hash_len_33_to_64(s: &[u8]) -> u64 {
    let len = s.len();

    let mut z = fetch64(s, 24);
    let mut a = fetch64(s, 0).wrapping_add(
        (len as u64)
            .wrapping_add(fetch64(s, len - 16))
            .wrapping_mul(K0),
    );
    let mut b = a.wrapping_add(z).rotate_right(52);
    let mut c = a.rotate_right(37);
    a = a.wrapping_add(fetch64(s, 8));
    c = c.wrapping_add(a.rotate_right(7));
    a = a.wrapping_add(fetch64(s, 16));
    let vf = a.wrapping_add(z);
    let vs = b.wrapping_add(a.rotate_right(31)).wrapping_add(c);

    a = fetch64(s, 16).wrapping_add(fetch64(s, len - 32));
    z = fetch64(s, len - 8);
    b = a.wrapping_add(z).rotate_right(52);
    c = a.rotate_right(37);
    a = a.wrapping_add(fetch64(s, len - 24));
    c = c.wrapping_add(a.rotate_right(7));
    a = a.wrapping_add(fetch64(s, len - 16));
    let wf = a.wrapping_add(z);
    let ws = b.wrapping_add(a.rotate_right(31)).wrapping_add(c);

    let r = shift_mix(
        vf.wrapping_add(ws)
            .wrapping_mul(K2)
            .wrapping_add(wf.wrapping_add(vs).wrapping_mul(K0)),
    );
    shift_mix(r.wrapping_mul(K0).wrapping_add(vs)).wrapping_mul(K2)
}

/// Mix 32 bytes of `s` into the seeds `a` and `b`
fn weak_hash_len_32_with_seeds(s: &[u8], mut a: u64, mut b: u64) -> (u64, u64) {
    let w = fetch64(s, 0);
    let x = fetch64(s, 8);
    let y = fetch64(s, 16);
    let z = fetch64(s, 24);

    a = a.wrapping_add(w);
    b = b.wrapping_add(a).wrapping_add(z).rotate_right(21);
    let c = a;
    a = a.wrapping_add(x).wrapping_add(y);
    b = b.wrapping_add(a.rotate_right(44));
    (a.wrapping_add(z), b.wrapping_add(c))
}
