//! Static page and service worker served to the browser.
//!
//! The page keeps no logic of its own: it renders every `UiState` pushed over `/events`, plays
//! the feedback sound when `sound_seq` moves and posts to `/start` when the button is clicked.

pub const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>Llama detector</title>
  <style>
    body { font-family: sans-serif; margin: 0; background: #fafafa; transition: background 0.3s; }
    .page { padding: 2em; text-align: center; }
    .hidden { display: none; }
    #video { max-width: 100%; border: 4px solid transparent; }
    body.llama { background: #ffe066; }
    body.llama #video { border-color: #e67700; }
    body.badger { background: #ced4da; }
    #status::after { content: "Starting camera..."; }
    body.detecting #status::after { content: "Looking for llamas..."; }
    body.llama #status::after { content: "Llama!"; }
    body.badger #status::after { content: "Badger? Badger!"; }
  </style>
</head>
<body>
  <div id="page-intro" class="page">
    <h1>Llama detector</h1>
    <div id="supported">
      <p>Point your camera at a llama.</p>
      <button id="btn-go">Start</button>
    </div>
    <div id="unsupported" class="hidden">
      <p>Sorry, llama detection is not available here.</p>
      <pre id="error-msg"></pre>
    </div>
  </div>
  <div id="page-detector" class="page hidden">
    <h2 id="status"></h2>
    <img id="video" alt="camera preview">
    <p id="top-label"></p>
  </div>
  <script>
  (() => {
    const pages = document.querySelectorAll('.page');
    const supportedDiv = document.getElementById('supported');
    const unsupportedDiv = document.getElementById('unsupported');
    const errorMsg = document.getElementById('error-msg');
    const video = document.getElementById('video');
    const topLabel = document.getElementById('top-label');
    let lastSoundSeq = null;

    function showPage(pageName) {
      pages.forEach(page => page.classList.add('hidden'));
      document.getElementById(`page-${pageName}`).classList.remove('hidden');
    }

    function beep() {
      const ctx = new (window.AudioContext || window.webkitAudioContext)();
      const osc = ctx.createOscillator();
      osc.frequency.value = 880;
      osc.connect(ctx.destination);
      osc.start();
      osc.stop(ctx.currentTime + 0.2);
    }

    function playSound() {
      new Audio('/audio/feedback').play().catch(() => beep());
    }

    function render(state) {
      showPage(state.page);
      const supported = state.support === 'supported';
      supportedDiv.classList.toggle('hidden', !supported);
      unsupportedDiv.classList.toggle('hidden', supported);
      errorMsg.textContent = state.error || '';
      document.body.className = state.classes.join(' ');

      if (state.page === 'detector' && !video.src) {
        video.src = `/video?t=${Date.now()}`;
      } else if (state.page !== 'detector') {
        video.removeAttribute('src');
      }

      topLabel.textContent = state.top
        ? `${state.top.class_name} (${(state.top.probability * 100).toFixed(1)}%)`
        : '';

      if (lastSoundSeq !== null && state.sound_seq > lastSoundSeq) {
        playSound();
      }
      lastSoundSeq = state.sound_seq;
    }

    const events = new EventSource('/events');
    events.onmessage = (msg) => render(JSON.parse(msg.data));
    events.onerror = (err) => console.error('event stream error', err);

    document.getElementById('btn-go').addEventListener('click', () => {
      fetch('/start', { method: 'POST' })
        .catch(err => console.error('start failed', err));
    });

    if ('serviceWorker' in navigator) {
      navigator.serviceWorker.register('/service-worker.js')
        .then(() => console.log('Service worker successfully registered'))
        .catch(err => console.error('Service worker failed to register', err));
    } else {
      console.log('Service workers not supported');
    }
  })();
  </script>
</body>
</html>
"#;

/// Caches the page and the sound for offline use, live endpoints always go to the network.
pub const SERVICE_WORKER_JS: &str = r#"const CACHE_NAME = 'llama-detector-v1';
const ASSETS = ['/', '/audio/feedback'];

self.addEventListener('install', (event) => {
  event.waitUntil(
    caches.open(CACHE_NAME)
      .then(cache => Promise.all(ASSETS.map(asset => cache.add(asset).catch(() => null))))
  );
});

self.addEventListener('activate', (event) => {
  event.waitUntil(
    caches.keys().then(keys => Promise.all(
      keys.filter(key => key !== CACHE_NAME).map(key => caches.delete(key))
    ))
  );
});

self.addEventListener('fetch', (event) => {
  const url = new URL(event.request.url);
  if (event.request.method !== 'GET' || !ASSETS.includes(url.pathname)) {
    return;
  }
  event.respondWith(
    fetch(event.request).catch(() => caches.match(event.request))
  );
});
"#;
