//! Techo de peticiones compartido por todos los runs (ventana fija).
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use log::debug;

pub struct RateCeiling {
    max_requests: u64,
    window: Duration,
    state: Mutex<(u64, Instant)>, // (peticiones en la ventana, inicio de ventana)
}

impl RateCeiling {
    pub fn new(max_requests: u64, window: Duration) -> Self {
        Self { max_requests: max_requests.max(1),
               window,
               state: Mutex::new((0, Instant::now())) }
    }

    pub fn per_second(max_requests: u64) -> Self {
        Self::new(max_requests, Duration::from_secs(1))
    }

    /// `Ok(())` si hay cupo; si no, el tiempo hasta que se abra la ventana.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        // El estado son dos contadores; un pánico a medias no lo invalida.
        let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        if now.duration_since(st.1) >= self.window {
            *st = (0, now);
        }
        if st.0 >= self.max_requests {
            return Err(self.window.saturating_sub(now.duration_since(st.1)));
        }
        st.0 += 1;
        Ok(())
    }

    /// Bloquea el hilo hasta obtener cupo.
    pub fn acquire(&self) {
        while let Err(wait) = self.try_acquire() {
            debug!("rate ceiling reached, waiting {wait:?}");
            std::thread::sleep(wait.max(Duration::from_millis(1)));
        }
    }
}
