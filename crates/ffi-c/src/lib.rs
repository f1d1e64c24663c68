//! C ABI bridge over the wallet core.
//!
//! The embedder owns every handle it receives: `wallet_create`/`wallet_open`
//! return an opaque pointer that stays valid until `wallet_close`. All
//! functions return 0 on success and a stable error code otherwise.

use libc::{c_char, c_int, c_uchar, c_uint};
use sha3::{Digest, Sha3_256};
use std::ffi::CStr;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use wallet_core::{
    Keychain, KeyStore, KeyStoreOptions, WalletAddress, WalletError, DURATION_FOREVER,
};
use std::sync::Arc;

const WALLET_FILENAME: &str = "wallet.db";
const BBS_FILENAME: &str = "keys.bbs";

/// Opaque wallet handle. Lifecycle ends at `wallet_close`.
pub struct WalletHandle {
    keychain: Arc<Keychain>,
}

#[derive(Debug)]
enum FfiError {
    NullPointer,
    Utf8Invalid,
    CapacityInsufficient,
    Wallet(WalletError),
}

impl From<WalletError> for FfiError {
    fn from(value: WalletError) -> Self {
        Self::Wallet(value)
    }
}

impl FfiError {
    fn code(&self) -> c_int {
        match self {
            Self::NullPointer => 1,
            Self::Utf8Invalid => 2,
            Self::CapacityInsufficient => 3,
            Self::Wallet(WalletError::WrongPassword) => 10,
            Self::Wallet(WalletError::AlreadyInitialized(_)) => 11,
            Self::Wallet(WalletError::NotInitialized(_)) => 12,
            Self::Wallet(WalletError::InsufficientFunds { .. }) => 13,
            Self::Wallet(_) => 19,
        }
    }
}

/// One keychain row, flattened for the bridge.
#[repr(C)]
pub struct CoinInfo {
    pub id: u64,
    pub amount: u64,
    pub status: c_uchar,
    pub key_type: c_uchar,
    pub create_height: u64,
    pub maturity: u64,
    pub confirm_height: u64,
    pub locked_height: u64,
    pub confirm_hash: [u8; 32],
}

unsafe fn read_cstr<'a>(ptr: *const c_char) -> Result<&'a str, FfiError> {
    if ptr.is_null() {
        return Err(FfiError::NullPointer);
    }
    CStr::from_ptr(ptr).to_str().map_err(|_| FfiError::Utf8Invalid)
}

fn wallet_db_path(dir: &str) -> PathBuf {
    Path::new(dir).join(WALLET_FILENAME)
}

fn timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn register(out_handle: *mut *mut WalletHandle, keychain: Keychain) -> c_int {
    let handle = Box::new(WalletHandle {
        keychain: Arc::new(keychain),
    });
    unsafe {
        *out_handle = Box::into_raw(handle);
    }
    0
}

fn create_inner(dir: &str, password: &str, seed_phrase: &str) -> Result<Keychain, FfiError> {
    let seed_hash: [u8; 32] = Sha3_256::digest(seed_phrase.as_bytes()).into();
    let keychain = Keychain::init(wallet_db_path(dir), password, &seed_hash)?;

    // Fresh wallets carry one default own address from the BBS key store.
    let keystore = KeyStore::create(
        KeyStoreOptions::local_file(Path::new(dir).join(BBS_FILENAME)),
        password,
    )?;
    let wallet_id = keystore.gen_keypair();
    keystore.save_keypair(&wallet_id, true)?;
    keychain.save_address(WalletAddress {
        wallet_id,
        label: "default".into(),
        create_time: timestamp(),
        duration: DURATION_FOREVER,
        own: true,
    })?;
    Ok(keychain)
}

#[no_mangle]
/// # Safety
/// `dir`, `password` and `seed_phrase` must be valid NUL-terminated strings;
/// `out_handle` must be a writable pointer slot.
pub unsafe extern "C" fn wallet_create(
    dir: *const c_char,
    password: *const c_char,
    seed_phrase: *const c_char,
    out_handle: *mut *mut WalletHandle,
) -> c_int {
    if out_handle.is_null() {
        return FfiError::NullPointer.code();
    }
    let (dir, password, seed_phrase) =
        match (read_cstr(dir), read_cstr(password), read_cstr(seed_phrase)) {
            (Ok(d), Ok(p), Ok(s)) => (d, p, s),
            (Err(err), _, _) | (_, Err(err), _) | (_, _, Err(err)) => return err.code(),
        };
    match create_inner(dir, password, seed_phrase) {
        Ok(keychain) => register(out_handle, keychain),
        Err(err) => err.code(),
    }
}

#[no_mangle]
/// # Safety
/// `dir` and `password` must be valid NUL-terminated strings; `out_handle`
/// must be a writable pointer slot.
pub unsafe extern "C" fn wallet_open(
    dir: *const c_char,
    password: *const c_char,
    out_handle: *mut *mut WalletHandle,
) -> c_int {
    if out_handle.is_null() {
        return FfiError::NullPointer.code();
    }
    let (dir, password) = match (read_cstr(dir), read_cstr(password)) {
        (Ok(d), Ok(p)) => (d, p),
        (Err(err), _) | (_, Err(err)) => return err.code(),
    };
    match Keychain::open(wallet_db_path(dir), password) {
        Ok(keychain) => register(out_handle, keychain),
        Err(err) => FfiError::from(err).code(),
    }
}

#[no_mangle]
/// # Safety
/// `dir` must be a valid NUL-terminated string.
pub unsafe extern "C" fn wallet_is_initialized(dir: *const c_char) -> c_int {
    match read_cstr(dir) {
        Ok(dir) => Keychain::is_initialized(wallet_db_path(dir)) as c_int,
        Err(_) => 0,
    }
}

#[no_mangle]
/// # Safety
/// `handle` must have come from `wallet_create`/`wallet_open` and must not
/// be used afterwards. A null handle is a no-op.
pub unsafe extern "C" fn wallet_close(handle: *mut WalletHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

#[no_mangle]
/// # Safety
/// `handle` must be a live handle; `new_password` a valid NUL-terminated
/// string.
pub unsafe extern "C" fn wallet_change_password(
    handle: *mut WalletHandle,
    new_password: *const c_char,
) -> c_int {
    if handle.is_null() {
        return FfiError::NullPointer.code();
    }
    let new_password = match read_cstr(new_password) {
        Ok(p) => p,
        Err(err) => return err.code(),
    };
    match (*handle).keychain.change_password(new_password) {
        Ok(()) => 0,
        Err(err) => FfiError::from(err).code(),
    }
}

#[no_mangle]
/// # Safety
/// `handle` must be a live handle; `out_height` and `out_hash32` must be
/// writable (the hash buffer holds 32 bytes).
pub unsafe extern "C" fn wallet_get_system_state(
    handle: *mut WalletHandle,
    out_height: *mut u64,
    out_hash32: *mut c_uchar,
) -> c_int {
    if handle.is_null() || out_height.is_null() || out_hash32.is_null() {
        return FfiError::NullPointer.code();
    }
    let state = (*handle).keychain.get_system_state_id();
    *out_height = state.height;
    std::ptr::copy_nonoverlapping(state.hash.as_ptr(), out_hash32, state.hash.len());
    0
}

#[no_mangle]
/// # Safety
/// `handle` must be a live handle. `out_coins` must point to at least
/// `capacity` `CoinInfo` slots (may be null when `capacity` is 0);
/// `out_count` must be writable. When the buffer is too small the total
/// count is still written and `CapacityInsufficient` returned.
pub unsafe extern "C" fn wallet_get_utxos(
    handle: *mut WalletHandle,
    out_coins: *mut CoinInfo,
    capacity: c_uint,
    out_count: *mut c_uint,
) -> c_int {
    if handle.is_null() || out_count.is_null() {
        return FfiError::NullPointer.code();
    }

    let mut coins = Vec::new();
    (*handle).keychain.visit(|coin| {
        coins.push(coin.clone());
        true
    });

    *out_count = coins.len() as c_uint;
    if coins.len() > capacity as usize {
        return FfiError::CapacityInsufficient.code();
    }
    if coins.is_empty() {
        return 0;
    }
    if out_coins.is_null() {
        return FfiError::NullPointer.code();
    }

    for (index, coin) in coins.iter().enumerate() {
        let row = CoinInfo {
            id: coin.id,
            amount: coin.amount,
            status: coin.status as c_uchar,
            key_type: coin.key_type as c_uchar,
            create_height: coin.create_height,
            maturity: coin.maturity,
            confirm_height: coin.confirm_height,
            locked_height: coin.locked_height,
            confirm_hash: coin.confirm_hash,
        };
        std::ptr::write(out_coins.add(index), row);
    }
    0
}
