use lbx_crypto::{decrypt, derive_key, encrypt, generate_salt, KdfParams, VaultKey};
use secrecy::SecretString;

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_encrypt(bencher: divan::Bencher, size: usize) {
    let key = VaultKey::from_bytes([0xAB; 32]);
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| encrypt(divan::black_box(&data), divan::black_box(&key)).unwrap());
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_decrypt(bencher: divan::Bencher, size: usize) {
    let key = VaultKey::from_bytes([0xAB; 32]);
    let sealed = encrypt(&make_data(size), &key).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| decrypt(divan::black_box(&sealed), divan::black_box(&key)).unwrap());
}

/// Single unlock latency with the default parameters.
#[divan::bench(sample_count = 10)]
fn bench_derive_key_default() {
    let password = SecretString::from("correct-horse-battery-staple");
    let salt = generate_salt();
    derive_key(&password, &salt, &KdfParams::default()).unwrap();
}

fn main() {
    divan::main();
}
